//! KPI normalization: separator stripping, BCDF tactic grouping, placeholder
//! cleanup, and the PMAX/VLA split repair.
//!
//! Every step is idempotent, so normalizing an already-normalized record is a
//! no-op. Nothing here fails; values that cannot be used are left as they are
//! or replaced with placeholders.

use crate::record::{
    Channel, Figure, KpiRecord, Metric, MetricValue, OrganizedTactics, Tactics,
};
use crate::render::pmax_matches_vla;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// A whole number written with thousands separators, e.g. `1,234,567`.
static GROUPED_INTEGER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(,\d{3})+$").unwrap());

/// Tactic keywords that indicate Google / Performance Max spend.
const PMAX_TOKENS: &[&str] = &["GOOGLE", "PMAX", "SEARCH"];

/// Tactic keywords that indicate paid social spend.
const SOCIAL_TOKENS: &[&str] = &["FACEBOOK", "META", "SOCIAL", "AIA"];

/// Video metrics that are dropped together when none holds real data.
const VIDEO_METRICS: [Metric; 4] = [Metric::Views, Metric::ViewRate, Metric::Cpc, Metric::Cpm];

/// VLA impressions below this share of PMAX impressions suggest a split slide.
const VLA_SPLIT_RATIO: f64 = 0.25;

/// Which stores the PMAX/VLA split repair applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VlaRepairScope {
    /// Only stores whose name contains one of these fragments (case-insensitive).
    Stores(Vec<String>),
    /// Every store.
    AnyStore,
}

impl Default for VlaRepairScope {
    fn default() -> Self {
        // The only account where the split has been observed.
        VlaRepairScope::Stores(vec!["palmer".to_string()])
    }
}

impl VlaRepairScope {
    fn applies_to(&self, store_name: Option<&str>) -> bool {
        match self {
            VlaRepairScope::AnyStore => true,
            VlaRepairScope::Stores(fragments) => {
                let store = store_name.unwrap_or_default().to_lowercase();
                fragments
                    .iter()
                    .filter(|f| !f.trim().is_empty())
                    .any(|f| store.contains(&f.to_lowercase()))
            }
        }
    }
}

/// Normalizer for raw KPI records.
#[derive(Debug, Clone)]
pub struct KpiNormalizer {
    vla_repair_scope: VlaRepairScope,
    derive_cost_per_conversion: bool,
}

impl Default for KpiNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl KpiNormalizer {
    /// Create a normalizer with the default repair scope.
    pub fn new() -> Self {
        Self {
            vla_repair_scope: VlaRepairScope::default(),
            derive_cost_per_conversion: true,
        }
    }

    /// Set which stores the PMAX/VLA split repair applies to.
    pub fn with_vla_repair_scope(mut self, scope: VlaRepairScope) -> Self {
        self.vla_repair_scope = scope;
        self
    }

    /// Set whether a missing VLA cost per conversion is derived from CPC,
    /// clicks and conversions.
    pub fn with_derive_cost_per_conversion(mut self, derive: bool) -> Self {
        self.derive_cost_per_conversion = derive;
        self
    }

    /// Normalize a record in place.
    pub fn normalize_in_place(&self, record: &mut KpiRecord) {
        strip_thousands_separators(record);
        gate_bcdf(record);
        organize_bcdf_tactics(record);
        cleanup_placeholders(record);
        self.repair_pmax_vla_split(record);
        if self.derive_cost_per_conversion {
            derive_vla_cost_per_conversion(record);
        }
    }

    /// Normalize a record, returning the canonical copy.
    pub fn normalize(&self, mut record: KpiRecord) -> KpiRecord {
        self.normalize_in_place(&mut record);
        record
    }

    /// Move PMAX totals onto the VLA group when a "PerformanceMax w/ VLA"
    /// slide was split in two.
    ///
    /// Returns true when the repair was applied.
    pub fn repair_pmax_vla_split(&self, record: &mut KpiRecord) -> bool {
        if record.pmax.is_empty() || record.pmax_vla.is_empty() {
            return false;
        }
        let pmax_impr = record.pmax.get(Metric::Impr).and_then(MetricValue::as_count);
        let vla_impr = record.pmax_vla.get(Metric::Impr).and_then(MetricValue::as_count);
        let (Some(pmax_impr), Some(vla_impr)) = (pmax_impr, vla_impr) else {
            return false;
        };

        let suspicious = vla_impr > 0 && (vla_impr as f64) < pmax_impr as f64 * VLA_SPLIT_RATIO;
        if !suspicious || !self.vla_repair_scope.applies_to(record.store_name.as_deref()) {
            return false;
        }

        log::info!(
            "Repairing split PMAX/VLA slide for {:?}: VLA impressions {} vs PMAX {}",
            record.store_name_or_default(),
            vla_impr,
            pmax_impr
        );

        for metric in Metric::CORE {
            match record.pmax.get(metric).cloned() {
                Some(value) => {
                    record.pmax_vla.insert(metric, value);
                }
                None => {
                    record.pmax_vla.remove(metric);
                }
            }
            record.pmax.insert(metric, MetricValue::placeholder_for(metric));
        }
        true
    }
}

/// Normalize with default settings.
pub fn normalize(record: KpiRecord) -> KpiRecord {
    KpiNormalizer::new().normalize(record)
}

fn strip_figure_separators(figure: &mut Figure) {
    if let Some(text) = figure.text() {
        if GROUPED_INTEGER_REGEX.is_match(text) {
            let stripped = text.replace(',', "");
            figure.set_text(stripped);
        }
    }
}

/// Remove thousands separators from whole-number strings.
fn strip_thousands_separators(record: &mut KpiRecord) {
    for channel in Channel::ALL {
        for value in record.group_mut(channel).values_mut() {
            match value {
                MetricValue::Number(figure) => strip_figure_separators(figure),
                MetricValue::NumberList(list) => list.iter_mut().for_each(strip_figure_separators),
                MetricValue::Placeholder(_) => {}
            }
        }
    }

    for value in record.extra.values_mut() {
        if let Value::String(s) = value {
            if GROUPED_INTEGER_REGEX.is_match(s) {
                *s = s.replace(',', "");
            }
        }
    }
}

/// Demote records whose single tactic string never mentions BCDF.
fn gate_bcdf(record: &mut KpiRecord) {
    if let Some(Tactics::Text(text)) = &record.bcdf_tactics {
        if record.has_bcdf && !text.to_uppercase().contains("BCDF") {
            log::debug!("Tactic string {:?} does not mention BCDF; clearing has_bcdf", text);
            record.has_bcdf = false;
        }
    }
}

/// Split a stringified list such as `['Google PMax', 'Facebook AIA']`.
///
/// Brackets are stripped, items are split on commas, and surrounding quotes
/// and whitespace are trimmed. The input is never evaluated.
pub fn parse_tactic_list(text: &str) -> Vec<String> {
    let inner = text.trim();
    let inner = inner.strip_prefix('[').unwrap_or(inner);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_tactic(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_marker = match trimmed.get(..9) {
        Some(head) if head.eq_ignore_ascii_case("CAMPAIGN:") => &trimmed[9..],
        _ => trimmed,
    };
    without_marker
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn has_any_token(tactic: &str, tokens: &[&str]) -> bool {
    let upper = tactic.to_uppercase();
    tokens.iter().any(|t| upper.contains(t))
}

/// Group tactics into the Performance Max and Paid Social buckets.
pub fn organize_tactics(tactics: &[String]) -> OrganizedTactics {
    let mut pmax = Vec::new();
    let mut social = Vec::new();

    for tactic in tactics {
        if has_any_token(tactic, PMAX_TOKENS) {
            pmax.push(tactic);
        } else if has_any_token(tactic, SOCIAL_TOKENS) {
            social.push(tactic);
        }
    }

    let tactics_list = if pmax.is_empty() && social.is_empty() {
        let joined = tactics.join(", ");
        if joined.trim().is_empty() {
            "Unknown".to_string()
        } else {
            joined
        }
    } else {
        [
            (!pmax.is_empty()).then_some("Performance Max"),
            (!social.is_empty()).then_some("Paid Social"),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ")
    };

    OrganizedTactics {
        pmax: !pmax.is_empty(),
        paid_social: !social.is_empty(),
        tactics_list,
    }
}

fn organize_bcdf_tactics(record: &mut KpiRecord) {
    if !record.has_bcdf {
        return;
    }
    let raw = match &record.bcdf_tactics {
        Some(Tactics::List(items)) => items.clone(),
        Some(Tactics::Text(text)) => parse_tactic_list(text),
        None => Vec::new(),
    };
    let cleaned: Vec<String> = raw
        .iter()
        .map(|t| clean_tactic(t))
        .filter(|t| !t.is_empty())
        .collect();
    record.bcdf_tactics_organized = Some(organize_tactics(&cleaned));
}

/// Drop the video group when it has no real data, and the optional BCDF
/// fields when they are placeholders.
fn cleanup_placeholders(record: &mut KpiRecord) {
    let has_real_video = VIDEO_METRICS
        .iter()
        .any(|m| record.video.get(*m).is_some_and(|v| !v.is_placeholder()));
    if !has_real_video {
        for metric in VIDEO_METRICS {
            record.video.remove(metric);
        }
    }

    for metric in [Metric::Vdp, Metric::Conv] {
        if record.bcdf.get(metric).is_some_and(MetricValue::is_placeholder) {
            record.bcdf.remove(metric);
        }
    }
}

/// Fill in a missing VLA cost per conversion from CPC × clicks ÷ conversions.
///
/// When the PMAX group mirrors the VLA group the derived figure is written
/// to both, so the renderer still folds them into one section.
fn derive_vla_cost_per_conversion(record: &mut KpiRecord) {
    let mirrored = pmax_matches_vla(record);
    let group = &record.pmax_vla;
    if group.get(Metric::CostConv).is_some_and(|v| !v.is_placeholder()) {
        return;
    }
    let cpc = group.get(Metric::Cpc).and_then(MetricValue::resolve);
    let clicks = group.get(Metric::Clicks).and_then(MetricValue::resolve);
    let conv = group.get(Metric::Conv).and_then(MetricValue::resolve);
    let (Some(cpc), Some(clicks), Some(conv)) = (cpc, clicks, conv) else {
        return;
    };
    if conv <= 0.0 {
        return;
    }

    let text = format!("{:.2}", cpc * clicks / conv);
    let Ok(rounded) = text.parse::<f64>() else {
        return;
    };
    if let Some(figure) = Figure::with_text(rounded, format!("${}", text)) {
        log::debug!("Derived pmax_vla_cost_conv = ${}", text);
        if mirrored {
            record
                .pmax
                .insert(Metric::CostConv, MetricValue::Number(figure.clone()));
        }
        record.pmax_vla.insert(Metric::CostConv, MetricValue::Number(figure));
    }
}
