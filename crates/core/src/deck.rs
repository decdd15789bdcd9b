//! Per-slide processing of a deck: classification, the local field-parser
//! path, and the structured document handed to a KPI provider.

use crate::classify::{classify, ChannelTag};
use crate::fields::{parse_field, FieldKind};
use crate::record::{Channel, Figure, KpiRecord, Metric, MetricValue, Tactics};
use crate::types::Deck;
use regex::Regex;
use std::sync::LazyLock;

/// Store name on the intro slide: "Prepared for: <store>".
static PREPARED_FOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)prepared\s+for[\s:|]*([^\n]+)").unwrap());

/// Report period such as "04/01/2025 - 04/30/2025".
static DATE_RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}/\d{1,2}/\d{2,4}\s*[-\x{2013}]\s*\d{1,2}/\d{1,2}/\d{2,4}").unwrap()
});

/// Lines carrying a count, a currency amount, or a rate next to its label.
static METRIC_LINE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\d{1,3}(?:,\d{3})*\s*(?:Impressions|Clicks|Conversions|Views|Reach|VDP\s+Views)",
        r"(?i)\$\d+\.\d{2}\s*(?:CPC|CPM|Cost|Cost / Conversion|Cost per Conversion)",
        r"(?i)\d+\.\d+%\s*(?:CTR|Conversion Rate|View Rate)",
        r"(?i)(?:Impressions|Clicks|Conversions|Views|Reach|CPC|CPM|View Rate|Cost / Conversion)\s*[:|]\s*\$?\d",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Campaign name fragments used in dealership account naming.
static CAMPAIGN_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:New_AIA|Used\|CPO|PMax_|VLA_)\w+").unwrap());

type FieldSpec = (Metric, &'static str, FieldKind);

const CORE_FIELDS: &[FieldSpec] = &[
    (Metric::Impr, "Impressions", FieldKind::Integer),
    (Metric::Clicks, "Clicks", FieldKind::Integer),
    (Metric::Cpc, "CPC", FieldKind::Currency),
    (Metric::Conv, "Conversions", FieldKind::Integer),
    (Metric::CostConv, "Cost / Conversion", FieldKind::Currency),
];

const SOCIAL_FIELDS: &[FieldSpec] = &[
    (Metric::Reach, "Reach", FieldKind::Integer),
    (Metric::Impr, "Impressions", FieldKind::Integer),
    (Metric::Clicks, "Clicks", FieldKind::Integer),
    (Metric::Cpc, "CPC", FieldKind::Currency),
    (Metric::Vdp, "VDP Views", FieldKind::Integer),
];

const VIDEO_FIELDS: &[FieldSpec] = &[
    (Metric::Views, "Views", FieldKind::Integer),
    (Metric::ViewRate, "View Rate", FieldKind::Percent),
    (Metric::Cpc, "CPC", FieldKind::Currency),
    (Metric::Cpm, "CPM", FieldKind::Currency),
];

const DEMAND_GEN_FIELDS: &[FieldSpec] = &[
    (Metric::Impr, "Impressions", FieldKind::Integer),
    (Metric::Clicks, "Clicks", FieldKind::Integer),
    (Metric::Cpm, "CPM", FieldKind::Currency),
    (Metric::Cpc, "CPC", FieldKind::Currency),
    (Metric::Conv, "Conversions", FieldKind::Integer),
];

const BCDF_FIELDS: &[FieldSpec] = &[
    (Metric::Impr, "Impressions", FieldKind::Integer),
    (Metric::Clicks, "Clicks", FieldKind::Integer),
    (Metric::Cpc, "CPC", FieldKind::Currency),
    (Metric::Vdp, "VDP Views", FieldKind::Integer),
    (Metric::Conv, "Conversions", FieldKind::Integer),
];

/// A slide with its raw text and channel tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSlide {
    pub number: usize,
    pub tag: ChannelTag,
    pub text: String,
}

/// Classify every slide of a deck.
pub fn classify_deck(deck: &Deck) -> Vec<ClassifiedSlide> {
    deck.slides
        .iter()
        .map(|slide| {
            let text = slide.raw_text();
            let tag = classify(&text);
            log::debug!("Slide {} classified as {}", slide.number, tag);
            ClassifiedSlide {
                number: slide.number,
                tag,
                text,
            }
        })
        .collect()
}

fn channel_for(tag: ChannelTag) -> Option<(Channel, &'static [FieldSpec])> {
    match tag {
        ChannelTag::Rsa => Some((Channel::Rsa, CORE_FIELDS)),
        ChannelTag::Pmax => Some((Channel::Pmax, CORE_FIELDS)),
        ChannelTag::PmaxVla => Some((Channel::PmaxVla, CORE_FIELDS)),
        ChannelTag::Social => Some((Channel::Social, SOCIAL_FIELDS)),
        ChannelTag::Video => Some((Channel::Video, VIDEO_FIELDS)),
        ChannelTag::DemandGen => Some((Channel::DemandGen, DEMAND_GEN_FIELDS)),
        ChannelTag::Bcdf => Some((Channel::Bcdf, BCDF_FIELDS)),
        ChannelTag::Other => None,
    }
}

/// Record a parsed value unless a real one was already seen.
fn merge_metric(record: &mut KpiRecord, channel: Channel, metric: Metric, parsed: Option<f64>) {
    let value = parsed
        .and_then(Figure::from_f64)
        .map(MetricValue::Number)
        .unwrap_or_else(|| MetricValue::placeholder_for(metric));

    let group = record.group_mut(channel);
    let keep_existing = group.get(metric).is_some_and(|v| !v.is_placeholder());
    if !keep_existing {
        group.insert(metric, value);
    }
}

fn identity_fields(record: &mut KpiRecord, text: &str) {
    if record.store_name.is_none() {
        if let Some(caps) = PREPARED_FOR_REGEX.captures(text) {
            let store = caps[1].trim();
            if !store.is_empty() {
                record.store_name = Some(store.to_string());
            }
        }
    }
    if record.date_range.is_none() {
        if let Some(m) = DATE_RANGE_REGEX.find(text) {
            record.date_range = Some(m.as_str().to_string());
        }
    }
}

/// Build a raw KPI record from classified slides with the field parser.
///
/// This is the local alternative to asking a provider; its output goes
/// through the same normalizer.
pub fn local_kpis(slides: &[ClassifiedSlide]) -> KpiRecord {
    let mut record = KpiRecord::new();

    for slide in slides {
        identity_fields(&mut record, &slide.text);

        let Some((channel, fields)) = channel_for(slide.tag) else {
            continue;
        };

        for (metric, label, kind) in fields {
            let parsed = parse_field(&slide.text, label, *kind);
            log::debug!(
                "Slide {}: {} = {:?}",
                slide.number,
                channel.key(*metric),
                parsed
            );
            merge_metric(&mut record, channel, *metric, parsed);
        }

        if channel == Channel::Bcdf {
            record.has_bcdf = true;
            if record.bcdf_tactics.is_none() {
                let first_line = slide.text.lines().next().unwrap_or_default().trim();
                record.bcdf_tactics = Some(Tactics::Text(first_line.to_string()));
            }
        }
    }

    record
}

/// Prefix metric and campaign lines so a provider can spot them.
fn mark_lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if METRIC_LINE_REGEXES.iter().any(|re| re.is_match(line)) {
                format!("METRIC: {}", line)
            } else if CAMPAIGN_LINE_REGEX.is_match(line) {
                format!("CAMPAIGN: {}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render classified slides as the sectioned text a provider reads.
pub fn structured_document(slides: &[ClassifiedSlide]) -> String {
    let separator = "-".repeat(80);
    slides
        .iter()
        .map(|slide| {
            format!(
                "--- SLIDE {} | TYPE: {} ---\n{}\n{}",
                slide.number,
                slide.tag,
                mark_lines(&slide.text),
                separator
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
