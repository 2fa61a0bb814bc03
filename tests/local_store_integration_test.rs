use anyhow::Result;
use search_tailor::adapters::memory_page::PageFixture;
use search_tailor::core::rule_store::ENTRIES_KEY;
use search_tailor::core::treatment;
use search_tailor::domain::ports::{KeyValueStore, Page, RuleStore};
use search_tailor::utils::validation::Validate;
use search_tailor::{
    LocalStore, MemoryPage, SessionState, TailorConfig, TailoringSession, TreatmentKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn duckduckgo_fixture() -> Result<PageFixture> {
    let fixture = serde_json::from_value(serde_json::json!({
        "url": "https://duckduckgo.com/?q=rust+async",
        "body": [{
            "tag": "div",
            "id": "links",
            "children": [
                {"tag": "div", "classes": ["result"], "children": [
                    {"tag": "a", "classes": ["result__a"], "href": "https://docs.rs/tokio"}
                ]},
                {"tag": "div", "classes": ["result"], "children": [
                    {"tag": "a", "classes": ["result__a"], "href": "https://www.pinterest.com/pin/1"}
                ]},
                {"tag": "div", "classes": ["result"], "children": [
                    {"tag": "a", "classes": ["result__a"], "href": "https://blog.example/rust"}
                ]}
            ]
        }]
    }))?;
    Ok(fixture)
}

fn result_markers(page: &MemoryPage) -> Vec<Vec<TreatmentKind>> {
    page.query_selector_all(None, "#links .result")
        .into_iter()
        .map(|node| treatment::markers(page, node))
        .collect()
}

#[tokio::test]
async fn test_config_driven_session_over_local_store() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store_path = temp_dir.path().join("nested").join("entries.json");
    let store_path_str = store_path.to_str().unwrap().replace('\\', "/");

    let config_content = format!(
        r#"
[defaults]
treatment = "screen"

[[defaults.entries]]
id = "d-1"
domain = "docs.rs"
treatment = "spotlight"

[store]
path = "{}"
"#,
        store_path_str
    );
    let config = TailorConfig::from_toml_str(&config_content)?;
    config.validate()?;

    let backend = LocalStore::new(config.store_path().unwrap());
    let rule_store = Arc::new(config.rule_store(backend));
    let registry = config.registry()?;

    let page = Arc::new(MemoryPage::from_fixture(&duckduckgo_fixture()?));
    let mut session = TailoringSession::bind(page.clone(), rule_store.clone(), &registry).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.engine().map(|e| e.name.as_str()), Some("duckduckgo"));
    assert!(session.has_observer());
    assert_eq!(
        result_markers(&page),
        vec![vec![TreatmentKind::Spotlight], vec![], vec![]]
    );
    // Nothing has been written yet.
    assert!(!store_path.exists());

    let added = tokio_test::assert_ok!(rule_store.add_entry("pinterest.com", None).await);
    assert_eq!(added.treatment, TreatmentKind::Screen);
    assert!(store_path.exists());

    assert_eq!(session.process_pending().await, 1);
    assert_eq!(
        result_markers(&page),
        vec![
            vec![TreatmentKind::Spotlight],
            vec![TreatmentKind::Screen],
            vec![],
        ]
    );

    session.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_persisted_entries_survive_new_handles() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("entries.json");

    let writer = TailorConfig::default().rule_store(LocalStore::new(&path));
    let first = writer.add_entry("a.com", Some(TreatmentKind::Suppress)).await?;
    let second = writer.add_entry("b.com", Some(TreatmentKind::Spotlight)).await?;

    let reader = TailorConfig::default().rule_store(LocalStore::new(&path));
    let entries = reader.entries().await?;
    // Defaults are persisted together with the first added entry.
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(&ids[3..], &[first.id.as_str(), second.id.as_str()]);

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    let _subscription = reader.on_change(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(reader.remove_entry(&first.id).await?);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    let rules = writer.get_rules().await?;
    assert_eq!(rules.len(), 4);
    assert!(rules.iter().all(|rule| rule.domain != "a.com"));

    // Known gap: change notifications stay with the writing handle, so
    // `reader` sees this write on its next read but is never told about it.
    assert!(writer.remove_entry(&second.id).await?);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(reader.get_rules().await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_store_file_keeps_page_untouched() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("entries.json");
    let backend = LocalStore::new(&path);
    backend
        .set(
            ENTRIES_KEY,
            serde_json::json!([{"id": "1", "domain": "docs.rs", "treatment": "screen"}]),
        )
        .await?;

    let config = TailorConfig::default();
    let rule_store = Arc::new(config.rule_store(backend));
    let page = Arc::new(MemoryPage::from_fixture(&duckduckgo_fixture()?));
    let session = TailoringSession::bind(page.clone(), rule_store, &config.registry()?).await;
    assert_eq!(
        result_markers(&page),
        vec![vec![TreatmentKind::Screen], vec![], vec![]]
    );

    std::fs::write(&path, "{ not json")?;
    tokio_test::assert_err!(session.retailor().await);
    assert_eq!(
        result_markers(&page),
        vec![vec![TreatmentKind::Screen], vec![], vec![]]
    );
    Ok(())
}
