//! Email rendering for canonical KPI records.
//!
//! A record is first laid out as an [`EmailDocument`]: the ordered list of
//! visible sections with their formatted rows. The HTML and plain-text
//! emails are both written from that one document, so they always agree on
//! which sections appear and what values they show.

use crate::format::{format_value, NumberFormat};
use crate::record::{Channel, KpiRecord, Metric, Tactics};
use serde::Serialize;

/// A metric row: display label, channel, and metric.
type Row = (&'static str, Channel, Metric);

/// A channel section of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub channel: Channel,
    pub title: &'static str,
    rows: &'static [Row],
}

const RSA_ROWS: &[Row] = &[
    ("Impressions", Channel::Rsa, Metric::Impr),
    ("Clicks", Channel::Rsa, Metric::Clicks),
    ("Avg. CPC", Channel::Rsa, Metric::Cpc),
    ("Conversions", Channel::Rsa, Metric::Conv),
    ("Cost per Conversion", Channel::Rsa, Metric::CostConv),
];

const PMAX_ROWS: &[Row] = &[
    ("Impressions", Channel::Pmax, Metric::Impr),
    ("Clicks", Channel::Pmax, Metric::Clicks),
    ("Avg. CPC", Channel::Pmax, Metric::Cpc),
    ("Conversions", Channel::Pmax, Metric::Conv),
    ("Cost per Conversion", Channel::Pmax, Metric::CostConv),
];

const PMAX_VLA_ROWS: &[Row] = &[
    ("Impressions", Channel::PmaxVla, Metric::Impr),
    ("Clicks", Channel::PmaxVla, Metric::Clicks),
    ("Avg. CPC", Channel::PmaxVla, Metric::Cpc),
    ("Conversions", Channel::PmaxVla, Metric::Conv),
    ("Cost per Conversion", Channel::PmaxVla, Metric::CostConv),
];

const DEMAND_GEN_ROWS: &[Row] = &[
    ("Impressions", Channel::DemandGen, Metric::Impr),
    ("Clicks", Channel::DemandGen, Metric::Clicks),
    ("CPM", Channel::DemandGen, Metric::Cpm),
    ("Avg. CPC", Channel::DemandGen, Metric::Cpc),
    ("Conversions", Channel::DemandGen, Metric::Conv),
];

const SOCIAL_ROWS: &[Row] = &[
    ("Reach", Channel::Social, Metric::Reach),
    ("Impressions", Channel::Social, Metric::Impr),
    ("Clicks", Channel::Social, Metric::Clicks),
    ("Avg. CPC", Channel::Social, Metric::Cpc),
    ("VDP Views", Channel::Social, Metric::Vdp),
];

const VIDEO_ROWS: &[Row] = &[
    ("Views", Channel::Video, Metric::Views),
    ("View\u{2011}through Rate", Channel::Video, Metric::ViewRate),
    ("Avg. CPC", Channel::Video, Metric::Cpc),
    ("CPM", Channel::Video, Metric::Cpm),
];

const BCDF_ROWS: &[Row] = &[
    ("Impressions", Channel::Bcdf, Metric::Impr),
    ("Clicks", Channel::Bcdf, Metric::Clicks),
    ("Avg. CPC", Channel::Bcdf, Metric::Cpc),
    ("VDP Views", Channel::Bcdf, Metric::Vdp),
    ("Conversions", Channel::Bcdf, Metric::Conv),
];

/// Report sections in output order.
pub const SECTIONS: [SectionSpec; 7] = [
    SectionSpec { channel: Channel::Rsa, title: "GOOGLE SEARCH CAMPAIGNS (RSA)", rows: RSA_ROWS },
    SectionSpec { channel: Channel::Pmax, title: "PERFORMANCEMAX CAMPAIGNS", rows: PMAX_ROWS },
    SectionSpec { channel: Channel::PmaxVla, title: "PERFORMANCEMAX w/ VLA CAMPAIGNS", rows: PMAX_VLA_ROWS },
    SectionSpec { channel: Channel::DemandGen, title: "GOOGLE DEMAND GEN CAMPAIGNS", rows: DEMAND_GEN_ROWS },
    SectionSpec { channel: Channel::Social, title: "SOCIAL ADS", rows: SOCIAL_ROWS },
    SectionSpec { channel: Channel::Video, title: "VIDEO / DISPLAY CAMPAIGNS", rows: VIDEO_ROWS },
    SectionSpec { channel: Channel::Bcdf, title: "BUSINESS CENTER DIRECTED FUNDS (BCDF)", rows: BCDF_ROWS },
];

/// One formatted metric line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedRow {
    pub label: &'static str,
    pub key: String,
    pub value: String,
}

/// A visible section with its formatted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedSection {
    pub title: &'static str,
    /// Tactic summary, shown before the rows (BCDF only).
    pub tactics: Option<String>,
    pub rows: Vec<RenderedRow>,
}

/// Everything an email shows, before markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailDocument {
    pub period: String,
    pub store: String,
    pub date_range: String,
    pub sections: Vec<RenderedSection>,
}

impl EmailDocument {
    pub fn subject(&self) -> String {
        format!("{} MTD Digital Marketing Report \u{2013} {}", self.period, self.store)
    }

    pub fn section_titles(&self) -> Vec<&'static str> {
        self.sections.iter().map(|s| s.title).collect()
    }
}

/// The rendered email pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub html: String,
    pub plain: String,
}

/// Renders KPI records into summary emails.
#[derive(Debug, Clone, Default)]
pub struct EmailRenderer {
    number_format: NumberFormat,
}

impl EmailRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use different separators or currency symbol.
    pub fn with_number_format(mut self, number_format: NumberFormat) -> Self {
        self.number_format = number_format;
        self
    }

    fn rows_for(&self, kpis: &KpiRecord, spec: &SectionSpec) -> Vec<RenderedRow> {
        spec.rows
            .iter()
            .filter_map(|&(label, channel, metric)| {
                let key = channel.key(metric);
                let value = kpis.group(channel).get(metric)?;
                let value = format_value(&key, value, &self.number_format)?;
                Some(RenderedRow { label, key, value })
            })
            .collect()
    }

    /// Lay out the visible sections of a record.
    pub fn layout(&self, kpis: &KpiRecord, period_label: &str) -> EmailDocument {
        let skip_pmax = pmax_matches_vla(kpis);
        let mut sections = Vec::new();

        for spec in &SECTIONS {
            if spec.channel == Channel::Pmax && skip_pmax {
                log::debug!("PMAX figures duplicate the VLA section; omitting PMAX");
                continue;
            }
            if spec.channel == Channel::Bcdf && !kpis.has_bcdf {
                continue;
            }
            let rows = self.rows_for(kpis, spec);
            if rows.is_empty() {
                continue;
            }
            let tactics = (spec.channel == Channel::Bcdf).then(|| tactic_summary(kpis));
            sections.push(RenderedSection {
                title: spec.title,
                tactics,
                rows,
            });
        }

        EmailDocument {
            period: period_label.to_string(),
            store: kpis.store_name_or_default().to_string(),
            date_range: kpis.date_range_or_default().to_string(),
            sections,
        }
    }

    /// Render both email forms.
    pub fn render(&self, kpis: &KpiRecord, period_label: &str) -> Email {
        let doc = self.layout(kpis, period_label);
        Email {
            html: render_html(&doc),
            plain: render_plain(&doc),
        }
    }
}

/// Render with default formatting.
pub fn render(kpis: &KpiRecord, period_label: &str) -> Email {
    EmailRenderer::new().render(kpis, period_label)
}

/// True when both PMAX groups have real data and agree on every core metric.
pub fn pmax_matches_vla(kpis: &KpiRecord) -> bool {
    if !kpis.pmax.has_real_value() || !kpis.pmax_vla.has_real_value() {
        return false;
    }
    Metric::CORE
        .iter()
        .all(|m| kpis.pmax.get(*m) == kpis.pmax_vla.get(*m))
}

fn tactic_summary(kpis: &KpiRecord) -> String {
    if let Some(organized) = &kpis.bcdf_tactics_organized {
        if !organized.tactics_list.trim().is_empty() {
            return organized.tactics_list.clone();
        }
    }
    let joined = match &kpis.bcdf_tactics {
        Some(Tactics::List(items)) => items.join(", "),
        Some(Tactics::Text(text)) => text.clone(),
        None => String::new(),
    };
    if joined.trim().is_empty() {
        "Unknown".to_string()
    } else {
        joined
    }
}

/// Escape text for inclusion in HTML.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_html(doc: &EmailDocument) -> String {
    let store = escape_html(&doc.store);
    let mut html = String::new();

    html.push_str("<div style=\"font-family:Arial, sans-serif; color:#000; font-size:12px;\">\n");
    html.push_str(&format!("<p><b>SUBJECT:</b> {}</p>\n", escape_html(&doc.subject())));
    html.push_str("<p>Hello!</p>\n");
    html.push_str(&format!(
        "<p>Attached is the month\u{2011}to\u{2011}date performance report for <b>{}</b>, covering <b>{}</b>.</p>\n",
        store,
        escape_html(&doc.date_range)
    ));
    html.push_str("<p><b>KPI Breakdown by Channel:</b></p>\n");

    for section in &doc.sections {
        html.push_str(&format!("<p><b>{}</b></p>\n", escape_html(section.title)));
        if let Some(tactics) = &section.tactics {
            html.push_str(&format!("<p><i>Tactics: {}</i></p>\n", escape_html(tactics)));
        }
        html.push_str("<ul>\n");
        for row in &section.rows {
            html.push_str(&format!(
                "    <li>{}: {}</li>\n",
                escape_html(row.label),
                escape_html(&row.value)
            ));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("<p>Thank you,</p></div>");
    html
}

fn render_plain(doc: &EmailDocument) -> String {
    let mut lines = vec![
        format!("SUBJECT: {}", doc.subject()),
        String::new(),
        "Hello!".to_string(),
        String::new(),
        format!(
            "Attached is the month\u{2011}to\u{2011}date performance report for {}, covering {}.",
            doc.store, doc.date_range
        ),
        String::new(),
        "KPI Breakdown by Channel:".to_string(),
    ];

    for section in &doc.sections {
        lines.push(String::new());
        lines.push(section.title.to_string());
        if let Some(tactics) = &section.tactics {
            lines.push(format!("Tactics: {}", tactics));
        }
        for row in &section.rows {
            lines.push(format!("- {}: {}", row.label, row.value));
        }
    }

    lines.push(String::new());
    lines.push("Thank you,".to_string());
    lines.join("\n")
}

/// A rendered email tagged with its source file and store.
#[derive(Debug, Clone)]
pub struct BatchEntry<'a> {
    pub filename: &'a str,
    pub store: &'a str,
    pub email: &'a Email,
}

/// Join several plain-text emails, each under a banner naming its file.
pub fn render_batch_plain(entries: &[BatchEntry<'_>]) -> String {
    let banner = "=".repeat(40);
    entries
        .iter()
        .map(|e| format!("{banner}\n{}\n{banner}\n{}\n\n", e.filename, e.email.plain))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Join several HTML emails into one standalone page.
pub fn render_batch_html(entries: &[BatchEntry<'_>]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>All Dealership Reports</title>\n<style>\nbody { font-family: Arial, sans-serif; }\n.email-container { margin-bottom: 50px; border-bottom: 2px solid #ddd; padding-bottom: 30px; }\nh2 { color: #2c3e50; }\n</style>\n</head>\n<body>\n",
    );
    for entry in entries {
        html.push_str(&format!(
            "<div class=\"email-container\">\n<h2>{} - {}</h2>\n{}\n</div>\n",
            escape_html(entry.store),
            escape_html(entry.filename),
            entry.email.html
        ));
    }
    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> KpiRecord {
        KpiRecord::from_json(&value).unwrap()
    }

    #[test]
    fn test_sections_render_in_order() {
        let kpis = record(json!({
            "store_name": "Acme Motors",
            "social_reach": "9000",
            "rsa_impr": "1200",
            "dg_impr": "300",
        }));
        let doc = EmailRenderer::new().layout(&kpis, "April 2025");
        assert_eq!(
            doc.section_titles(),
            vec![
                "GOOGLE SEARCH CAMPAIGNS (RSA)",
                "GOOGLE DEMAND GEN CAMPAIGNS",
                "SOCIAL ADS"
            ]
        );
    }

    #[test]
    fn test_placeholder_rows_are_skipped() {
        let kpis = record(json!({
            "rsa_impr": "1200",
            "rsa_clicks": "[xxx]",
            "rsa_cpc": "$2.10",
        }));
        let email = render(&kpis, "April 2025");
        assert!(email.plain.contains("- Impressions: 1,200"));
        assert!(email.plain.contains("- Avg. CPC: $2.10"));
        assert!(!email.plain.contains("Clicks"));
        assert!(!email.html.contains("[xxx]"));
    }

    #[test]
    fn test_section_with_only_placeholders_is_hidden() {
        let kpis = record(json!({"social_reach": "[x,xxx]", "social_cpc": "$x.xx"}));
        let email = render(&kpis, "April 2025");
        assert!(!email.plain.contains("SOCIAL ADS"));
        assert!(!email.html.contains("SOCIAL ADS"));
    }

    #[test]
    fn test_pmax_hidden_when_identical_to_vla() {
        let kpis = record(json!({
            "pmax_impr": "5000", "pmax_clicks": "100", "pmax_cpc": "$1.00",
            "pmax_conv": "4", "pmax_cost_conv": "$25.00",
            "pmax_vla_impr": "5000", "pmax_vla_clicks": "100", "pmax_vla_cpc": "$1.00",
            "pmax_vla_conv": "4", "pmax_vla_cost_conv": "$25.00",
        }));
        assert!(pmax_matches_vla(&kpis));
        let doc = EmailRenderer::new().layout(&kpis, "May 2025");
        assert_eq!(doc.section_titles(), vec!["PERFORMANCEMAX w/ VLA CAMPAIGNS"]);
    }

    #[test]
    fn test_pmax_shown_when_different() {
        let kpis = record(json!({
            "pmax_impr": "5000",
            "pmax_vla_impr": "4000",
        }));
        assert!(!pmax_matches_vla(&kpis));
        let doc = EmailRenderer::new().layout(&kpis, "May 2025");
        assert_eq!(doc.sections.len(), 2);
    }

    #[test]
    fn test_bcdf_tactics_before_metrics() {
        let kpis = record(json!({
            "has_bcdf": true,
            "bcdf_tactics_organized": {"pmax": true, "paid_social": false, "tactics_list": "Performance Max"},
            "bcdf_impr": "2000",
            "bcdf_cpc": "$0.75",
        }));
        let email = render(&kpis, "June 2025");
        let plain = &email.plain;
        let header = plain.find("BUSINESS CENTER DIRECTED FUNDS (BCDF)").unwrap();
        let tactics = plain.find("Tactics: Performance Max").unwrap();
        let first_metric = plain.find("- Impressions: 2,000").unwrap();
        assert!(header < tactics && tactics < first_metric);
        assert!(email.html.contains("<p><i>Tactics: Performance Max</i></p>"));
    }

    #[test]
    fn test_bcdf_hidden_without_flag() {
        let kpis = record(json!({"has_bcdf": false, "bcdf_impr": "2000"}));
        let doc = EmailRenderer::new().layout(&kpis, "June 2025");
        assert!(doc.sections.is_empty());
    }

    #[test]
    fn test_bcdf_tactic_fallbacks() {
        let kpis = record(json!({
            "has_bcdf": true,
            "bcdf_tactics": ["BCDF Radio"],
            "bcdf_clicks": "50",
        }));
        let doc = EmailRenderer::new().layout(&kpis, "June 2025");
        assert_eq!(doc.sections[0].tactics.as_deref(), Some("BCDF Radio"));

        let kpis = record(json!({"has_bcdf": true, "bcdf_clicks": "50"}));
        let doc = EmailRenderer::new().layout(&kpis, "June 2025");
        assert_eq!(doc.sections[0].tactics.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_header_and_defaults() {
        let email = render(&KpiRecord::new(), "April 2025");
        assert!(email
            .plain
            .starts_with("SUBJECT: April 2025 MTD Digital Marketing Report \u{2013} Unknown Dealership"));
        assert!(email.plain.contains("covering [Date Range]."));
        assert!(email.plain.ends_with("Thank you,"));
        assert!(email.html.ends_with("<p>Thank you,</p></div>"));
    }

    #[test]
    fn test_html_escapes_store_name() {
        let kpis = record(json!({"store_name": "Smith & Sons <Ram>"}));
        let email = render(&kpis, "April 2025");
        assert!(email.html.contains("Smith &amp; Sons &lt;Ram&gt;"));
        assert!(email.plain.contains("Smith & Sons <Ram>"));
    }

    #[test]
    fn test_value_formatting_in_output() {
        let kpis = record(json!({
            "dv_views": "15000",
            "dv_viewrate": "45.3",
            "dv_cpm": 12.5,
        }));
        let email = render(&kpis, "April 2025");
        assert!(email.plain.contains("- Views: 15,000"));
        assert!(email.plain.contains("- View\u{2011}through Rate: 45.30%"));
        assert!(email.plain.contains("- CPM: $12.50"));
    }

    #[test]
    fn test_custom_number_format() {
        let kpis = record(json!({"rsa_impr": "1234567", "rsa_cpc": "1.5"}));
        let renderer = EmailRenderer::new()
            .with_number_format(NumberFormat::us().with_grouping('.').with_decimal(','));
        let email = renderer.render(&kpis, "April 2025");
        assert!(email.plain.contains("- Impressions: 1.234.567"));
        assert!(email.plain.contains("- Avg. CPC: $1,50"));
    }

    #[test]
    fn test_batch_outputs() {
        let a = render(&record(json!({"store_name": "Acme"})), "April 2025");
        let b = render(&record(json!({"store_name": "Palmer"})), "April 2025");
        let entries = vec![
            BatchEntry { filename: "acme.pptx", store: "Acme", email: &a },
            BatchEntry { filename: "palmer.pptx", store: "Palmer", email: &b },
        ];
        let plain = render_batch_plain(&entries);
        assert!(plain.contains("acme.pptx"));
        assert!(plain.contains("palmer.pptx"));
        let html = render_batch_html(&entries);
        assert_eq!(html.matches("email-container\"").count(), 2);
        assert!(html.contains("<h2>Palmer - palmer.pptx</h2>"));
    }
}
