//! Core domain types, slide classification, KPI normalization, and email
//! rendering for dealership marketing report decks.

pub mod classify;
pub mod deck;
pub mod error;
pub mod fields;
pub mod format;
pub mod ingest;
pub mod normalize;
pub mod provider;
pub mod record;
pub mod render;
pub mod types;

pub use classify::{classify, ChannelTag};
pub use deck::{classify_deck, local_kpis, structured_document, ClassifiedSlide};
pub use error::{Error, Result};
pub use fields::{parse_field, FieldKind};
pub use format::NumberFormat;
pub use ingest::{ingest_response, is_placeholder, IngestOutcome};
pub use normalize::{KpiNormalizer, VlaRepairScope};
pub use provider::{request_kpis, CommandProvider, KpiProvider, RetryPolicy};
pub use record::{Channel, KpiRecord, Metric, MetricValue};
pub use render::{Email, EmailDocument, EmailRenderer};
pub use types::{Deck, DeckFormat, DeckSlide, SlideText};
