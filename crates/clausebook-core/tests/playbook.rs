//! PlaybookGenerator contract: noise exclusion, variant cardinality and
//! failure policies.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use clausebook_core::fakes::FakeLlm;
use clausebook_core::{
    CallPolicy, ClausebookError, ClusterMap, Favorability, FailurePolicy, PlaybookGenerator,
    PlaybookSettings, VariantSchema, NOISE,
};
use serde_json::{json, Value};

fn section_json(title: &str) -> Value {
    json!({
        "title": title,
        "variants": [
            {"text": "Zahlung binnen 14 Tagen.", "favorability": "Am Vorteilhaftesten", "justification": "Schneller Geldeingang."},
            {"text": "Zahlung binnen 30 Tagen.", "favorability": "Balanced / Ausgewogen", "justification": "Marktüblich."},
            {"text": "Zahlung binnen 45 Tagen.", "favorability": "Acceptable", "justification": "Noch vertretbar."},
            {"text": "Zahlung binnen 90 Tagen.", "favorability": "Inakzeptabel", "justification": "Liquiditätsrisiko."}
        ]
    })
}

fn three_variants(title: &str) -> Value {
    let mut value = section_json(title);
    value["variants"].as_array_mut().unwrap().pop();
    value
}

fn generator(llm: Arc<FakeLlm>, failure_policy: FailurePolicy) -> PlaybookGenerator {
    PlaybookGenerator::new(
        llm,
        PlaybookSettings {
            failure_policy,
            variant_schema: VariantSchema::Single,
        },
        CallPolicy::new(Duration::from_secs(120)),
        "German",
    )
}

fn clusters(entries: Vec<(i32, Vec<&str>)>) -> ClusterMap {
    let map: BTreeMap<i32, Vec<String>> = entries
        .into_iter()
        .map(|(id, texts)| (id, texts.into_iter().map(String::from).collect()))
        .collect();
    ClusterMap::from(map)
}

#[tokio::test]
async fn noise_is_never_sent_to_the_llm() {
    let llm = Arc::new(FakeLlm::always(section_json("Zahlungsbedingungen")));
    let map = clusters(vec![
        (NOISE, vec!["Secret noise clause"]),
        (0, vec!["Payment due in 30 days", "Payment within 30 days"]),
    ]);

    let playbook = generator(llm.clone(), FailurePolicy::Abort)
        .generate(&map)
        .await
        .unwrap();

    assert_eq!(playbook.sections.len(), 1);
    assert_eq!(llm.call_count(), 1);
    let sent = llm.calls()[0].user_content();
    assert!(!sent.contains("Secret noise clause"));
    assert!(sent.contains("Payment due in 30 days\n\nPayment within 30 days"));
}

#[tokio::test]
async fn every_section_has_four_distinct_ranked_variants() {
    let llm = Arc::new(FakeLlm::always(section_json("Zahlungsbedingungen")));
    let map = clusters(vec![(0, vec!["a"]), (1, vec!["b"]), (2, vec!["c"])]);

    let playbook = generator(llm, FailurePolicy::Abort).generate(&map).await.unwrap();

    assert_eq!(playbook.sections.len(), 3);
    for section in &playbook.sections {
        assert_eq!(section.variants.len(), 4);
        let labels: HashSet<Favorability> =
            section.variants.iter().map(|v| v.favorability).collect();
        assert_eq!(labels.len(), 4);
        assert_eq!(section.variants[0].favorability, Favorability::MostFavorable);
        assert_eq!(section.variants[3].favorability, Favorability::Unacceptable);
    }
}

#[tokio::test]
async fn sections_follow_cluster_id_order() {
    let llm = Arc::new(FakeLlm::from_fn(|messages, _| {
        let clauses = messages[1].content.trim_start_matches("Clauses:\n").to_string();
        Ok(section_json(&format!("Topic {clauses}")))
    }));
    let map = clusters(vec![(2, vec!["two"]), (0, vec!["zero"]), (1, vec!["one"])]);

    let playbook = generator(llm, FailurePolicy::Abort).generate(&map).await.unwrap();
    let titles: Vec<&str> = playbook.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Topic zero", "Topic one", "Topic two"]);
}

#[tokio::test]
async fn only_noise_gives_empty_playbook_without_calls() {
    let llm = Arc::new(FakeLlm::always(section_json("unused")));
    let map = clusters(vec![(NOISE, vec!["lonely clause"])]);

    let playbook = generator(llm.clone(), FailurePolicy::Abort)
        .generate(&map)
        .await
        .unwrap();
    assert!(playbook.is_empty());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn empty_cluster_is_skipped_without_a_call() {
    let llm = Arc::new(FakeLlm::always(section_json("Zahlung")));
    let map = clusters(vec![(0, vec![]), (1, vec!["x"])]);

    let playbook = generator(llm.clone(), FailurePolicy::Abort)
        .generate(&map)
        .await
        .unwrap();
    assert_eq!(playbook.sections.len(), 1);
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn abort_policy_stops_at_first_invalid_cluster() {
    let llm = Arc::new(FakeLlm::new(vec![
        Ok(section_json("ok")),
        Ok(three_variants("broken")),
        Ok(section_json("never")),
    ]));
    let map = clusters(vec![(0, vec!["a"]), (1, vec!["b"]), (2, vec!["c"])]);

    let err = generator(llm.clone(), FailurePolicy::Abort)
        .generate(&map)
        .await
        .unwrap_err();
    assert!(err.is_schema_validation());
    assert!(err.to_string().contains("playbook cluster 1"), "{err}");
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn skip_policy_records_invalid_clusters_and_continues() {
    let llm = Arc::new(FakeLlm::new(vec![
        Ok(section_json("first")),
        Ok(three_variants("broken")),
        Ok(section_json("third")),
    ]));
    let map = clusters(vec![(0, vec!["a"]), (1, vec!["b", "b2"]), (2, vec!["c"])]);

    let report = generator(llm, FailurePolicy::Skip)
        .generate_report(&map)
        .await
        .unwrap();

    let titles: Vec<&str> = report.playbook.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["first", "third"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].cluster_id, 1);
    assert_eq!(report.skipped[0].clauses, 2);
    assert_eq!(report.skipped[0].code, "schema_validation");
}

#[tokio::test]
async fn skip_policy_still_aborts_on_upstream_errors() {
    let llm = Arc::new(FakeLlm::new(vec![
        Ok(section_json("first")),
        Err(ClausebookError::upstream("chat", "HTTP 401 Unauthorized")),
    ]));
    let map = clusters(vec![(0, vec!["a"]), (1, vec!["b"])]);

    let err = generator(llm, FailurePolicy::Skip)
        .generate(&map)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "upstream_service");
    assert!(err.to_string().contains("playbook cluster 1"));
}

#[tokio::test]
async fn duplicate_variant_text_is_rejected() {
    let mut value = section_json("dup");
    value["variants"][2]["text"] = value["variants"][1]["text"].clone();
    let llm = Arc::new(FakeLlm::always(value));
    let map = clusters(vec![(0, vec!["a"])]);

    let err = generator(llm, FailurePolicy::Abort)
        .generate(&map)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("duplicate variant text"));
}

#[tokio::test]
async fn split_schema_keeps_external_justification() {
    let llm = Arc::new(FakeLlm::from_fn(|_, schema| {
        assert!(schema.name.contains("SplitVariantDraft"), "{}", schema.name);
        let variants: Vec<Value> = ["Most Favorable", "Balanced", "Acceptable", "Unacceptable"]
            .iter()
            .enumerate()
            .map(|(i, label)| {
                json!({
                    "text": format!("Variante {i}"),
                    "favorability": label,
                    "internal_justification": format!("intern {i}"),
                    "external_justification": format!("extern {i}"),
                })
            })
            .collect();
        Ok(json!({"title": "Haftung", "variants": variants}))
    }));
    let generator = PlaybookGenerator::new(
        llm,
        PlaybookSettings {
            failure_policy: FailurePolicy::Abort,
            variant_schema: VariantSchema::Split,
        },
        CallPolicy::new(Duration::from_secs(120)),
        "German",
    );

    let section = generator
        .generate_section(7, &["Liability is capped.".to_string()])
        .await
        .unwrap();
    assert_eq!(section.variants[0].justification, "intern 0\n\nextern 0");
    assert_eq!(
        section.variants[0].external_justification.as_deref(),
        Some("extern 0")
    );
}
