use kpi_core::normalize::normalize;
use kpi_core::render::{pmax_matches_vla, render, SECTIONS};
use kpi_core::{
    classify, classify_deck, is_placeholder, local_kpis, ChannelTag, Deck, Email, EmailRenderer,
    KpiNormalizer, KpiRecord, Metric, MetricValue, VlaRepairScope,
};
use proptest::prelude::*;
use proptest::test_runner::Config;
use regex::Regex;
use serde_json::{json, Map, Value};

fn record(value: Value) -> KpiRecord {
    KpiRecord::from_json(&value).unwrap()
}

fn full_mapping() -> Value {
    json!({
        "store_name": "Palmer Chrysler Dodge Jeep Ram",
        "date_range": "04/01/2025 - 04/30/2025",
        "rsa_impr": "12,345",
        "rsa_clicks": 678,
        "rsa_cpc": "$2.15",
        "rsa_conv": "[xx]",
        "rsa_cost_conv": "$x.xx",
        "pmax_impr": "250,000",
        "pmax_clicks": "3,100",
        "pmax_cpc": "$0.42",
        "pmax_conv": "85",
        "pmax_cost_conv": "$15.32",
        "pmax_vla_impr": "180,500",
        "pmax_vla_clicks": "2,050",
        "pmax_vla_cpc": "$0.51",
        "pmax_vla_conv": "40",
        "pmax_vla_cost_conv": "$x.xx",
        "dg_impr": "[x,xxx]",
        "dg_clicks": "[xxx]",
        "social_reach": "41,200",
        "social_impr": [95000, 12],
        "social_clicks": "1,020",
        "social_cpc": "$0.66",
        "social_vdp": "310",
        "dv_views": "22,000",
        "dv_viewrate": "38.5%",
        "dv_cpc": "$x.xx",
        "dv_cpm": "$9.80",
        "has_bcdf": true,
        "bcdf_tactics": "['BCDF Google PMax Used', 'BCDF Facebook AIA New']",
        "bcdf_impr": "5,400",
        "bcdf_clicks": "210",
        "bcdf_cpc": "$0.90",
        "bcdf_vdp": "[xxx]",
        "bcdf_conv": "12"
    })
}

/// Sections and their `label: value` rows, in order.
type Outline = Vec<(String, Vec<String>)>;

fn is_section_title(line: &str) -> bool {
    SECTIONS.iter().any(|s| s.title == line)
}

fn html_outline(html: &str) -> Outline {
    let token = Regex::new(r"<p><b>([^<]+)</b></p>|<li>([^<]*)</li>").unwrap();
    let mut outline: Outline = Vec::new();
    for caps in token.captures_iter(html) {
        if let Some(title) = caps.get(1) {
            if is_section_title(title.as_str()) {
                outline.push((title.as_str().to_string(), Vec::new()));
            }
        } else if let (Some(row), Some(last)) = (caps.get(2), outline.last_mut()) {
            last.1.push(row.as_str().to_string());
        }
    }
    outline
}

fn plain_outline(plain: &str) -> Outline {
    let mut outline: Outline = Vec::new();
    for line in plain.lines() {
        if is_section_title(line) {
            outline.push((line.to_string(), Vec::new()));
        } else if let (Some(row), Some(last)) = (line.strip_prefix("- "), outline.last_mut()) {
            last.1.push(row.to_string());
        }
    }
    outline
}

fn rendered(mapping: Value) -> Email {
    render(&normalize(record(mapping)), "April 2025")
}

#[test]
fn test_normalize_is_idempotent() {
    let samples = [
        full_mapping(),
        json!({}),
        json!({"store_name": "Palmer CDJR", "pmax_impr": "10000", "pmax_vla_impr": "500",
               "pmax_vla_cpc": "$1.00", "pmax_clicks": "900", "pmax_conv": "30"}),
        json!({"has_bcdf": true, "bcdf_tactics": "Google Search", "dv_views": "[x,xxx]"}),
        json!({"has_bcdf": true, "bcdf_tactics": ["CAMPAIGN: 'Meta Retargeting'"], "extra_total": "9,999"}),
    ];

    for sample in samples {
        let once = normalize(record(sample.clone()));
        let twice = normalize(once.clone());
        assert_eq!(once, twice, "normalization changed on second pass for {}", sample);
        assert_eq!(once.to_json(), twice.to_json());
    }
}

const PREFIXES: &[&str] = &["rsa_", "pmax_", "pmax_vla_", "dg_", "social_", "dv_", "bcdf_"];
const SUFFIXES: &[&str] = &[
    "impr", "clicks", "cpc", "conv", "cost_conv", "reach", "vdp", "views", "viewrate", "cpm",
];
const CORE_SUFFIXES: &[&str] = &["impr", "clicks", "cpc", "conv", "cost_conv"];
const PLACEHOLDERS: &[&str] = &["[x,xxx]", "[xxx]", "[xx]", "$x.xx", "x.xx%", "[x]"];
const STORES: &[&str] = &["Palmer CDJR", "Palmer Chrysler Dodge Jeep Ram", "Acme Motors", ""];
const TACTICS: &[&str] = &[
    "BCDF Google PMax",
    "Facebook AIA",
    "CAMPAIGN: 'Meta Retargeting'",
    "Google Search",
    "BCDF Radio",
];

fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn metric_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::sample::select(PLACEHOLDERS).prop_map(|p| json!(p)),
        (0u64..5_000_000).prop_map(|n| json!(grouped(n))),
        (0u64..5_000_000).prop_map(|n| json!(n.to_string())),
        (0u32..100_000).prop_map(|c| json!(format!("${}.{:02}", c / 100, c % 100))),
        (0u32..10_000).prop_map(|n| json!(format!("{}.{}%", n / 100, n % 10))),
        (0u64..1_000_000).prop_map(|n| json!(n)),
        prop::collection::vec(0u64..100_000, 1..3).prop_map(|v| json!(v)),
    ]
}

fn tactics_value() -> impl Strategy<Value = Value> {
    let list = prop::collection::vec(prop::sample::select(TACTICS), 0..4);
    prop_oneof![
        list.clone().prop_map(|items| json!(items)),
        list.prop_map(|items| {
            let quoted: Vec<String> = items.iter().map(|t| format!("'{}'", t)).collect();
            json!(format!("[{}]", quoted.join(", ")))
        }),
        prop::sample::select(TACTICS).prop_map(|t| json!(t)),
    ]
}

fn mapping() -> impl Strategy<Value = Value> {
    let key = (prop::sample::select(PREFIXES), prop::sample::select(SUFFIXES))
        .prop_map(|(prefix, suffix)| format!("{}{}", prefix, suffix));
    (
        prop::collection::btree_map(key, metric_value(), 0..12),
        prop::sample::select(STORES),
        any::<bool>(),
        prop::option::of(tactics_value()),
    )
        .prop_map(|(metrics, store, has_bcdf, tactics)| {
            let mut map: Map<String, Value> = metrics.into_iter().collect();
            if !store.is_empty() {
                map.insert("store_name".into(), json!(store));
            }
            map.insert("has_bcdf".into(), json!(has_bcdf));
            if let Some(tactics) = tactics {
                map.insert("bcdf_tactics".into(), tactics);
            }
            Value::Object(map)
        })
}

/// The same core figures written to both PMAX groups.
fn mirrored_pmax() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(prop::sample::select(CORE_SUFFIXES), metric_value(), 1..4).prop_map(
        |group| {
            let mut map = Map::new();
            for (suffix, value) in group {
                map.insert(format!("pmax_{}", suffix), value.clone());
                map.insert(format!("pmax_vla_{}", suffix), value);
            }
            map.insert("store_name".into(), json!("Palmer CDJR"));
            Value::Object(map)
        },
    )
}

proptest! {
    #![proptest_config(Config::with_cases(256))]

    #[test]
    fn normalize_is_idempotent_for_any_mapping(input in mapping()) {
        let once = normalize(record(input));
        let twice = normalize(once.clone());
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.to_json(), twice.to_json());
    }

    #[test]
    fn html_and_plain_agree_for_any_mapping(input in mapping()) {
        let email = render(&normalize(record(input)), "April 2025");
        prop_assert_eq!(html_outline(&email.html), plain_outline(&email.plain));
    }

    #[test]
    fn normalize_keeps_mirrored_pmax_folded(input in mirrored_pmax()) {
        let raw = record(input);
        let folded = pmax_matches_vla(&raw);
        let out = normalize(raw);
        if folded {
            prop_assert!(pmax_matches_vla(&out));
        }
    }
}

#[test]
fn test_html_and_plain_are_isomorphic() {
    let email = rendered(full_mapping());
    let html = html_outline(&email.html);
    let plain = plain_outline(&email.plain);

    assert!(!html.is_empty());
    assert_eq!(html, plain);
}

#[test]
fn test_isomorphic_on_sparse_record() {
    let email = rendered(json!({"social_clicks": "14", "dv_viewrate": "2.5"}));
    let html = html_outline(&email.html);
    assert_eq!(html, plain_outline(&email.plain));
    assert_eq!(
        html.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
        vec!["SOCIAL ADS", "VIDEO / DISPLAY CAMPAIGNS"]
    );
}

#[test]
fn test_rendered_rows_never_show_placeholders() {
    let email = rendered(full_mapping());
    for (title, rows) in plain_outline(&email.plain) {
        assert!(!rows.is_empty(), "{} rendered with no rows", title);
        for row in rows {
            let (_, value) = row.split_once(": ").unwrap();
            assert!(!is_placeholder(value), "{} shows placeholder {}", title, value);
            assert!(!value.contains("xx"), "{} shows placeholder {}", title, value);
        }
    }
}

#[test]
fn test_full_mapping_sections() {
    let kpis = normalize(record(full_mapping()));
    let email = render(&kpis, "April 2025");
    let outline = plain_outline(&email.plain);
    let titles: Vec<&str> = outline.iter().map(|(t, _)| t.as_str()).collect();

    assert_eq!(
        titles,
        vec![
            "GOOGLE SEARCH CAMPAIGNS (RSA)",
            "PERFORMANCEMAX CAMPAIGNS",
            "PERFORMANCEMAX w/ VLA CAMPAIGNS",
            "SOCIAL ADS",
            "VIDEO / DISPLAY CAMPAIGNS",
            "BUSINESS CENTER DIRECTED FUNDS (BCDF)",
        ]
    );
    assert_eq!(
        outline[0].1,
        vec!["Impressions: 12,345", "Clicks: 678", "Avg. CPC: $2.15"]
    );
    assert!(outline[2].1.contains(&"Cost per Conversion: $26.14".to_string()));
    assert!(outline[3].1.contains(&"Impressions: 95,000".to_string()));
    assert!(outline[4].1.contains(&"View\u{2011}through Rate: 38.50%".to_string()));
    assert!(email.plain.contains("Tactics: Performance Max, Paid Social"));
    assert!(email
        .plain
        .starts_with("SUBJECT: April 2025 MTD Digital Marketing Report \u{2013} Palmer Chrysler Dodge Jeep Ram"));
}

#[test]
fn test_comma_stripping() {
    let out = normalize(record(json!({"rsa_impr": "12,345"})));
    assert_eq!(out.to_json()["rsa_impr"], json!("12345"));
}

#[test]
fn test_pmax_vla_repair_for_palmer() {
    let input = json!({
        "store_name": "Palmer CDJR",
        "pmax_impr": "10000",
        "pmax_clicks": "400",
        "pmax_cpc": "$1.25",
        "pmax_conv": "20",
        "pmax_cost_conv": "$25.00",
        "pmax_vla_impr": "500"
    });
    let out = normalize(record(input));

    for metric in Metric::CORE {
        assert!(
            out.pmax.get(metric).is_some_and(MetricValue::is_placeholder),
            "pmax {:?} was not reset",
            metric
        );
    }
    assert_eq!(out.metric("pmax_vla_impr").and_then(MetricValue::resolve), Some(10000.0));
    assert_eq!(out.metric("pmax_vla_clicks").and_then(MetricValue::resolve), Some(400.0));
    assert_eq!(out.metric("pmax_vla_cost_conv").and_then(MetricValue::resolve), Some(25.0));

    let titles: Vec<String> = plain_outline(&render(&out, "April 2025").plain)
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert_eq!(titles, vec!["PERFORMANCEMAX w/ VLA CAMPAIGNS"]);
}

#[test]
fn test_derived_cost_keeps_duplicate_pmax_hidden() {
    let input = json!({
        "store_name": "Acme Motors",
        "pmax_impr": "44,000",
        "pmax_clicks": "900",
        "pmax_cpc": "$0.60",
        "pmax_conv": "18",
        "pmax_cost_conv": "$x.xx",
        "pmax_vla_impr": "44,000",
        "pmax_vla_clicks": "900",
        "pmax_vla_cpc": "$0.60",
        "pmax_vla_conv": "18",
        "pmax_vla_cost_conv": "$x.xx"
    });
    let renderer = EmailRenderer::new();
    let titles = |kpis: &KpiRecord| -> Vec<&'static str> {
        renderer
            .layout(kpis, "April 2025")
            .sections
            .iter()
            .map(|s| s.title)
            .collect()
    };

    let raw = record(input);
    assert_eq!(titles(&raw), vec!["PERFORMANCEMAX w/ VLA CAMPAIGNS"]);

    let out = normalize(raw);
    assert_eq!(titles(&out), vec!["PERFORMANCEMAX w/ VLA CAMPAIGNS"]);
    assert_eq!(out.metric("pmax_cost_conv").and_then(MetricValue::resolve), Some(30.0));
    assert_eq!(out.metric("pmax_vla_cost_conv").and_then(MetricValue::resolve), Some(30.0));

    let rows = &plain_outline(&render(&out, "April 2025").plain)[0].1;
    assert!(rows.contains(&"Cost per Conversion: $30.00".to_string()));
}

#[test]
fn test_pmax_vla_untouched_for_other_stores() {
    let input = json!({
        "store_name": "Acme Motors",
        "pmax_impr": "10000",
        "pmax_vla_impr": "500"
    });
    let out = normalize(record(input));
    assert_eq!(out.metric("pmax_impr").and_then(MetricValue::resolve), Some(10000.0));
    assert_eq!(out.metric("pmax_vla_impr").and_then(MetricValue::resolve), Some(500.0));

    let widened = KpiNormalizer::new()
        .with_vla_repair_scope(VlaRepairScope::AnyStore)
        .normalize(record(json!({
            "store_name": "Acme Motors",
            "pmax_impr": "10000",
            "pmax_vla_impr": "500"
        })));
    assert_eq!(widened.metric("pmax_vla_impr").and_then(MetricValue::resolve), Some(10000.0));
}

#[test]
fn test_bcdf_tactic_classification() {
    let out = normalize(record(json!({
        "has_bcdf": true,
        "bcdf_tactics": ["Google PMax Used", "Facebook AIA New"],
        "bcdf_impr": "100"
    })));
    let organized = out.bcdf_tactics_organized.as_ref().unwrap();
    assert!(organized.pmax);
    assert!(organized.paid_social);
    assert_eq!(organized.tactics_list, "Performance Max, Paid Social");
}

#[test]
fn test_video_suppressed_when_all_placeholders() {
    let email = rendered(json!({
        "rsa_impr": "1,000",
        "dv_views": "[x,xxx]",
        "dv_viewrate": "[xx.xx%]",
        "dv_cpc": "$x.xx",
        "dv_cpm": "$x.xx"
    }));
    assert!(!email.html.to_uppercase().contains("VIDEO"));
    assert!(!email.plain.to_uppercase().contains("VIDEO"));
    assert!(email.plain.contains("GOOGLE SEARCH CAMPAIGNS (RSA)"));
}

#[test]
fn test_classifier_prefers_vla() {
    assert_eq!(classify("PerformanceMax w/ VLA Campaigns"), ChannelTag::PmaxVla);
    assert_eq!(classify("Performance Max with VLA"), ChannelTag::PmaxVla);
    assert_eq!(classify("PerformanceMax Campaigns"), ChannelTag::Pmax);
}

#[test]
fn test_local_path_end_to_end() {
    let deck = Deck::from_texts(
        "palmer.pptx",
        vec![
            (1, "Account Performance Report\nPrepared for: Palmer CDJR\n04/01/2025 - 04/30/2025"),
            (2, "Search Overview\nImpressions: 8,200\nClicks: 310\nCPC: $1.95"),
            (3, "PerformanceMax w/ VLA\nImpressions: 44,000\nClicks: 900\nCPC: $0.60\nConversions: 18"),
            (4, "Video / Display\nViews: [x,xxx]"),
        ],
    );
    let kpis = normalize(local_kpis(&classify_deck(&deck)));
    let email = render(&kpis, "April 2025");

    assert_eq!(kpis.store_name.as_deref(), Some("Palmer CDJR"));
    assert_eq!(kpis.metric("pmax_vla_cost_conv").and_then(MetricValue::resolve), Some(30.0));
    assert!(kpis.video.is_empty());

    let outline = plain_outline(&email.plain);
    assert_eq!(outline, html_outline(&email.html));
    assert_eq!(
        outline.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>(),
        vec!["GOOGLE SEARCH CAMPAIGNS (RSA)", "PERFORMANCEMAX w/ VLA CAMPAIGNS"]
    );
    assert!(email.plain.contains("covering 04/01/2025 - 04/30/2025."));
}
