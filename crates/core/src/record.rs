//! The KPI record: per-channel metric groups with placeholder-aware values.
//!
//! Every metric value is either a placeholder (not observed) or resolvable to
//! a number. The untyped JSON form lives in [`crate::ingest`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder for large counts (impressions, reach, views).
pub const PLACEHOLDER_COUNT: &str = "[x,xxx]";
/// Placeholder for clicks and VDP views.
pub const PLACEHOLDER_CLICKS: &str = "[xxx]";
/// Placeholder for currency amounts.
pub const PLACEHOLDER_COST: &str = "$x.xx";
/// Placeholder for conversions.
pub const PLACEHOLDER_CONV: &str = "[xx]";
/// Placeholder for rates.
pub const PLACEHOLDER_RATE: &str = "[xx.xx%]";

/// Marketing channel groups, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Rsa,
    Pmax,
    PmaxVla,
    DemandGen,
    Social,
    Video,
    Bcdf,
}

impl Channel {
    /// All channels in report order.
    pub const ALL: [Channel; 7] = [
        Channel::Rsa,
        Channel::Pmax,
        Channel::PmaxVla,
        Channel::DemandGen,
        Channel::Social,
        Channel::Video,
        Channel::Bcdf,
    ];

    /// Key prefix used in the flat KPI mapping.
    pub fn prefix(self) -> &'static str {
        match self {
            Channel::Rsa => "rsa_",
            Channel::Pmax => "pmax_",
            Channel::PmaxVla => "pmax_vla_",
            Channel::DemandGen => "dg_",
            Channel::Social => "social_",
            Channel::Video => "dv_",
            Channel::Bcdf => "bcdf_",
        }
    }

    /// Split a flat key into its channel and the remaining suffix.
    ///
    /// `pmax_vla_` is tried before `pmax_`, so `pmax_vla_impr` never lands in
    /// the plain PMAX group.
    pub fn split_key(key: &str) -> Option<(Channel, &str)> {
        const ROUTES: [Channel; 7] = [
            Channel::PmaxVla,
            Channel::Pmax,
            Channel::Rsa,
            Channel::DemandGen,
            Channel::Social,
            Channel::Video,
            Channel::Bcdf,
        ];
        ROUTES
            .iter()
            .find_map(|c| key.strip_prefix(c.prefix()).map(|rest| (*c, rest)))
    }

    /// Flat key for a metric of this channel.
    pub fn key(self, metric: Metric) -> String {
        format!("{}{}", self.prefix(), metric.suffix())
    }
}

/// Metric suffixes shared by the channel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Impr,
    Clicks,
    Cpc,
    Conv,
    CostConv,
    Reach,
    Vdp,
    Views,
    ViewRate,
    Cpm,
}

impl Metric {
    /// The core group reported by search and PMAX channels.
    pub const CORE: [Metric; 5] = [
        Metric::Impr,
        Metric::Clicks,
        Metric::Cpc,
        Metric::Conv,
        Metric::CostConv,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Metric::Impr => "impr",
            Metric::Clicks => "clicks",
            Metric::Cpc => "cpc",
            Metric::Conv => "conv",
            Metric::CostConv => "cost_conv",
            Metric::Reach => "reach",
            Metric::Vdp => "vdp",
            Metric::Views => "views",
            Metric::ViewRate => "viewrate",
            Metric::Cpm => "cpm",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "impr" => Some(Metric::Impr),
            "clicks" => Some(Metric::Clicks),
            "cpc" => Some(Metric::Cpc),
            "conv" => Some(Metric::Conv),
            "cost_conv" => Some(Metric::CostConv),
            "reach" => Some(Metric::Reach),
            "vdp" => Some(Metric::Vdp),
            "views" => Some(Metric::Views),
            "viewrate" => Some(Metric::ViewRate),
            "cpm" => Some(Metric::Cpm),
            _ => None,
        }
    }

    /// The placeholder token written when this metric was not observed.
    pub fn default_placeholder(self) -> &'static str {
        match self {
            Metric::Impr | Metric::Reach | Metric::Views => PLACEHOLDER_COUNT,
            Metric::Clicks | Metric::Vdp => PLACEHOLDER_CLICKS,
            Metric::Cpc | Metric::Cpm | Metric::CostConv => PLACEHOLDER_COST,
            Metric::Conv => PLACEHOLDER_CONV,
            Metric::ViewRate => PLACEHOLDER_RATE,
        }
    }
}

/// How a figure was written in the source mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A string literal such as `"12,345"` or `"$4.12"`.
    Text(String),
    /// A bare JSON number.
    Number(serde_json::Number),
}

/// A resolved numeric value together with the literal it was read from.
///
/// The value is always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    value: f64,
    literal: Literal,
}

impl Figure {
    /// Build a figure from a plain number, keeping integers integral in JSON.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let number = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            serde_json::Number::from(value as i64)
        } else {
            serde_json::Number::from_f64(value)?
        };
        Some(Self {
            value,
            literal: Literal::Number(number),
        })
    }

    /// Build a figure from a JSON number.
    pub fn from_json_number(number: serde_json::Number) -> Option<Self> {
        let value = number.as_f64().filter(|v| v.is_finite())?;
        Some(Self {
            value,
            literal: Literal::Number(number),
        })
    }

    /// Parse a numeric string, ignoring `$`, `%`, thousands separators and spaces.
    ///
    /// Returns `None` when what remains is not a finite number.
    pub fn parse_text(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let cleaned: String = trimmed
            .chars()
            .filter(|c| !matches!(c, '$' | '%' | ',' | ' '))
            .collect();
        if cleaned.is_empty() {
            return None;
        }
        let value = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some(Self {
            value,
            literal: Literal::Text(trimmed.to_string()),
        })
    }

    /// A figure with an explicit textual literal, e.g. a derived `"$12.50"`.
    pub fn with_text(value: f64, text: impl Into<String>) -> Option<Self> {
        value.is_finite().then(|| Self {
            value,
            literal: Literal::Text(text.into()),
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    /// The string literal, if the figure was read from a string.
    pub fn text(&self) -> Option<&str> {
        match &self.literal {
            Literal::Text(s) => Some(s),
            Literal::Number(_) => None,
        }
    }

    /// The value as a non-negative whole count, if it is one.
    pub fn as_count(&self) -> Option<u64> {
        (self.value >= 0.0 && self.value.fract() == 0.0 && self.value < u64::MAX as f64)
            .then_some(self.value as u64)
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.literal = Literal::Text(text);
    }

    /// JSON form, preserving the original literal.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.literal {
            Literal::Text(s) => serde_json::Value::String(s.clone()),
            Literal::Number(n) => serde_json::Value::Number(n.clone()),
        }
    }
}

/// A single metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Not observed. Holds the token as it appeared (e.g. `[x,xxx]`).
    Placeholder(String),
    /// A single resolved number.
    Number(Figure),
    /// Several candidate numbers; the first one is authoritative.
    NumberList(Vec<Figure>),
}

impl MetricValue {
    /// The default placeholder for a metric.
    pub fn placeholder_for(metric: Metric) -> Self {
        MetricValue::Placeholder(metric.default_placeholder().to_string())
    }

    pub fn is_placeholder(&self) -> bool {
        match self {
            MetricValue::Placeholder(_) => true,
            MetricValue::Number(_) => false,
            MetricValue::NumberList(list) => list.is_empty(),
        }
    }

    /// The authoritative figure: the number itself or the first list entry.
    pub fn first_figure(&self) -> Option<&Figure> {
        match self {
            MetricValue::Placeholder(_) => None,
            MetricValue::Number(f) => Some(f),
            MetricValue::NumberList(list) => list.first(),
        }
    }

    /// Resolve to a number, if this is a real value.
    pub fn resolve(&self) -> Option<f64> {
        self.first_figure().map(Figure::value)
    }

    /// Resolve to a whole non-negative count, if possible.
    pub fn as_count(&self) -> Option<u64> {
        self.first_figure().and_then(Figure::as_count)
    }
}

/// The metrics observed for one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelGroup {
    values: BTreeMap<Metric, MetricValue>,
}

impl ChannelGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricValue> {
        self.values.get(&metric)
    }

    pub fn get_mut(&mut self, metric: Metric) -> Option<&mut MetricValue> {
        self.values.get_mut(&metric)
    }

    pub fn insert(&mut self, metric: Metric, value: MetricValue) -> Option<MetricValue> {
        self.values.insert(metric, value)
    }

    pub fn remove(&mut self, metric: Metric) -> Option<MetricValue> {
        self.values.remove(&metric)
    }

    pub fn contains(&self, metric: Metric) -> bool {
        self.values.contains_key(&metric)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when at least one metric holds a real value.
    pub fn has_real_value(&self) -> bool {
        self.values.values().any(|v| !v.is_placeholder())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &MetricValue)> {
        self.values.iter().map(|(m, v)| (*m, v))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut MetricValue> {
        self.values.values_mut()
    }
}

/// Raw BCDF tactics as reported: a list of campaign names or one string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tactics {
    List(Vec<String>),
    Text(String),
}

/// BCDF tactics grouped into the buckets shown in the report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizedTactics {
    #[serde(default)]
    pub pmax: bool,
    #[serde(default)]
    pub paid_social: bool,
    #[serde(default)]
    pub tactics_list: String,
}

/// Canonical KPI record for one report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiRecord {
    pub store_name: Option<String>,
    pub date_range: Option<String>,
    pub has_bcdf: bool,
    pub rsa: ChannelGroup,
    pub pmax: ChannelGroup,
    pub pmax_vla: ChannelGroup,
    pub demand_gen: ChannelGroup,
    pub social: ChannelGroup,
    pub video: ChannelGroup,
    pub bcdf: ChannelGroup,
    pub bcdf_tactics: Option<Tactics>,
    pub bcdf_tactics_organized: Option<OrganizedTactics>,
    /// Keys this model does not recognise, carried through untouched.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl KpiRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, channel: Channel) -> &ChannelGroup {
        match channel {
            Channel::Rsa => &self.rsa,
            Channel::Pmax => &self.pmax,
            Channel::PmaxVla => &self.pmax_vla,
            Channel::DemandGen => &self.demand_gen,
            Channel::Social => &self.social,
            Channel::Video => &self.video,
            Channel::Bcdf => &self.bcdf,
        }
    }

    pub fn group_mut(&mut self, channel: Channel) -> &mut ChannelGroup {
        match channel {
            Channel::Rsa => &mut self.rsa,
            Channel::Pmax => &mut self.pmax,
            Channel::PmaxVla => &mut self.pmax_vla,
            Channel::DemandGen => &mut self.demand_gen,
            Channel::Social => &mut self.social,
            Channel::Video => &mut self.video,
            Channel::Bcdf => &mut self.bcdf,
        }
    }

    /// Look up a metric by its flat key, e.g. `"pmax_vla_cpc"`.
    pub fn metric(&self, key: &str) -> Option<&MetricValue> {
        let (channel, suffix) = Channel::split_key(key)?;
        self.group(channel).get(Metric::from_suffix(suffix)?)
    }

    pub fn set(&mut self, channel: Channel, metric: Metric, value: MetricValue) {
        self.group_mut(channel).insert(metric, value);
    }

    /// Store name for display.
    pub fn store_name_or_default(&self) -> &str {
        self.store_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown Dealership")
    }

    /// Date range for display.
    pub fn date_range_or_default(&self) -> &str {
        self.date_range
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("[Date Range]")
    }
}
