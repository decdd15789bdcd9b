//! Slide classification by ordered keyword matching.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Matches "RSA" as a standalone word.
static RSA_WORD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bRSA\b").unwrap());

/// The kind of content a slide reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelTag {
    Rsa,
    Pmax,
    PmaxVla,
    Social,
    Video,
    DemandGen,
    Bcdf,
    Other,
}

impl ChannelTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelTag::Rsa => "RSA",
            ChannelTag::Pmax => "PMAX",
            ChannelTag::PmaxVla => "PMAX_VLA",
            ChannelTag::Social => "SOCIAL",
            ChannelTag::Video => "VIDEO",
            ChannelTag::DemandGen => "DEMAND_GEN",
            ChannelTag::Bcdf => "BCDF",
            ChannelTag::Other => "OTHER",
        }
    }
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn mentions_pmax(upper: &str) -> bool {
    upper.contains("PERFORMANCEMAX") || upper.contains("PERFORMANCE MAX")
}

fn mentions_vla(upper: &str) -> bool {
    upper.contains("W/ VLA") || upper.contains("WITH VLA")
}

/// Classify a slide by its raw text.
///
/// Checks run in a fixed order and the first hit wins. The VLA check has to
/// come before the bare PerformanceMax check since VLA slides mention both.
pub fn classify(slide_text: &str) -> ChannelTag {
    let upper = slide_text.to_uppercase();

    if mentions_pmax(&upper) && mentions_vla(&upper) {
        ChannelTag::PmaxVla
    } else if mentions_pmax(&upper) {
        ChannelTag::Pmax
    } else if upper.contains("SOCIAL ADS") {
        ChannelTag::Social
    } else if upper.contains("DEMAND GEN") {
        ChannelTag::DemandGen
    } else if upper.contains("VIDEO") && upper.contains("DISPLAY") {
        ChannelTag::Video
    } else if upper.contains("BCDF") || upper.contains("BUSINESS CENTER DIRECTED FUNDS") {
        ChannelTag::Bcdf
    } else if upper.contains("SEARCH OVERVIEW")
        || upper.contains("SEARCH CAMPAIGNS")
        || RSA_WORD_REGEX.is_match(&upper)
    {
        ChannelTag::Rsa
    } else {
        ChannelTag::Other
    }
}
