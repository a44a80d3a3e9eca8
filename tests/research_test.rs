mod common;

use common::{engine, init_logger, role_values, temp_state_path, test_config, FakeBrowser, FakeHttp, SEARCH_URL};
use research_scout::core::types::Role;
use research_scout::{ResearchError, ResearchOrchestrator, SelectorPolicy};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const HOME: &str = r#"<html><body><form action="/search"><input id="q" name="q" type="text"></form></body></html>"#;

const SERP_NEW_MARKUP: &str = r#"<html><body><div id="serp">
    <div class="hit"><h3><a href="https://docs.test/tokio">Tokio runtime tutorial</a></h3></div>
    <div class="hit"><h3><a href="https://recipes.test/">Soup</a></h3></div>
    <div class="hit"><h3><a href="/search?q=tokio&page=2">Next</a></h3></div>
</div></body></html>"#;

const SERP_NO_LINKS: &str = r#"<html><body><div class="captcha">Please verify you are human.</div></body></html>"#;

fn web() -> FakeHttp {
    FakeHttp::new()
        .page(
            "https://docs.test/tokio",
            r#"<html><head><title>Tokio tutorial</title></head><body>
               <p>The tokio runtime tutorial explains how the tokio runtime schedules async tasks on worker threads.</p>
               <a href="/tokio/spawn">spawning</a></body></html>"#,
        )
        .page(
            "https://docs.test/tokio/spawn",
            r#"<html><body><p>Spawning tasks on the tokio runtime returns a JoinHandle for each async task.</p></body></html>"#,
        )
        .page(
            "https://recipes.test/",
            r#"<html><body><p>Slow cooked vegetable soup with barley and fresh herbs from the garden.</p></body></html>"#,
        )
}

#[tokio::test]
async fn permanently_broken_result_selector_yields_no_results() {
    init_logger();
    let browser = Arc::new(FakeBrowser::new(SERP_NO_LINKS).page(SEARCH_URL, HOME));
    let policy = Arc::new(SelectorPolicy::new(Default::default()));
    let config = test_config(vec![engine(&["#q"], &["li.result a.title"])]);
    let orchestrator = ResearchOrchestrator::new(
        config,
        Arc::clone(&policy),
        Arc::new(web()),
        browser.clone(),
    )
    .unwrap();

    let run = orchestrator.research_with_diagnostics("test topic").await;

    assert!(run.outcome.is_no_results());
    assert_eq!(run.outcome.to_string(), "no results found for query: test topic");
    assert!(policy.value_of("mock", Role::ResultList, "li.result a.title").unwrap() < 0.0);
    assert!(policy.value_of("mock", Role::SearchBox, "#q").unwrap() > 0.0);

    let diag = &run.engines[0];
    assert_eq!(diag.engine, "mock");
    assert!(diag.penalties >= 1);
    assert!(diag.discovery_attempts >= 1);
    assert!(diag.error.is_some());
    assert_eq!(diag.result_urls, 0);
    assert!(run.result_urls.is_empty());

    assert_eq!(browser.submitted.lock().unwrap().as_slice(), ["test topic"]);
    assert_eq!(
        browser.launches.load(Ordering::SeqCst),
        browser.closes.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn discovery_heals_changed_result_markup() {
    init_logger();
    let http = Arc::new(web());
    let browser = Arc::new(FakeBrowser::new(SERP_NEW_MARKUP).page(SEARCH_URL, HOME));
    let policy = Arc::new(SelectorPolicy::new(Default::default()));
    let config = test_config(vec![engine(&["#q"], &["li.b_algo h2 a"])]);
    let orchestrator = ResearchOrchestrator::new(
        config,
        Arc::clone(&policy),
        http.clone(),
        browser,
    )
    .unwrap();

    let run = orchestrator
        .research_with_diagnostics("tokio runtime tutorial")
        .await;

    let diag = &run.engines[0];
    assert!(diag.error.is_none(), "engine failed: {:?}", diag.error);
    assert_eq!(diag.discovery_attempts, 1);
    assert!(!diag.discovered.is_empty());
    assert_eq!(
        run.result_urls,
        vec!["https://docs.test/tokio", "https://recipes.test/"]
    );

    // The healed selector is now the best-valued result candidate.
    let values = role_values(&policy, Role::ResultList);
    let (best, best_value) = values
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .unwrap();
    assert!(*best_value > 0.0);
    assert_ne!(best, "li.b_algo h2 a");

    let report = run.outcome.report().expect("report expected");
    let urls: Vec<&str> = report.sections.iter().map(|s| s.url.as_str()).collect();
    assert!(urls.contains(&"https://docs.test/tokio"));
    assert!(!urls.contains(&"https://recipes.test/"));
    assert!(report.total_chars() <= 400);
    assert!(report.render().contains("## Source: https://docs.test/tokio"));
    assert!(run.pages_collected >= 3);
    assert_eq!(http.calls("https://docs.test/tokio"), 1);
}

#[tokio::test]
async fn discovery_heals_broken_search_box() {
    let home = r#"<html><body><form role="search"><input name="query" type="search"></form></body></html>"#;
    let browser = Arc::new(FakeBrowser::new(SERP_NEW_MARKUP).page(SEARCH_URL, home));
    let policy = Arc::new(SelectorPolicy::new(Default::default()));
    let config = test_config(vec![engine(&["#old-box"], &["h3 a"])]);
    let orchestrator =
        ResearchOrchestrator::new(config, Arc::clone(&policy), Arc::new(web()), browser.clone())
            .unwrap();

    let run = orchestrator.research_with_diagnostics("tokio runtime").await;

    assert!(policy.value_of("mock", Role::SearchBox, "#old-box").unwrap() < 0.0);
    let healed = policy
        .value_of("mock", Role::SearchBox, "input[name=\"query\"]")
        .unwrap();
    assert!(healed > 0.0);
    assert_eq!(run.engines[0].result_urls, 2);
    assert_eq!(browser.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn located_but_unusable_search_box_is_penalized_and_healed() {
    init_logger();
    let browser = Arc::new(
        FakeBrowser::new(SERP_NEW_MARKUP)
            .page(SEARCH_URL, HOME)
            .not_interactable("#q"),
    );
    let policy = Arc::new(SelectorPolicy::new(Default::default()));
    let config = test_config(vec![engine(&["#q"], &["h3 a"])]);
    let orchestrator =
        ResearchOrchestrator::new(config, Arc::clone(&policy), Arc::new(web()), browser.clone())
            .unwrap();

    let run = orchestrator.research_with_diagnostics("tokio runtime").await;

    assert!(policy.value_of("mock", Role::SearchBox, "#q").unwrap() < 0.0);
    let healed = policy
        .value_of("mock", Role::SearchBox, "input[name=\"q\"]")
        .unwrap();
    assert!(healed > 0.0);

    let diag = &run.engines[0];
    assert!(diag.error.is_none(), "engine failed: {:?}", diag.error);
    assert_eq!(diag.penalties, 1);
    assert_eq!(diag.discovery_attempts, 1);
    assert_eq!(diag.result_urls, 2);
    assert_eq!(browser.submitted.lock().unwrap().as_slice(), ["tokio runtime"]);
}

#[tokio::test]
async fn hung_engine_navigation_is_bounded() {
    let browser = Arc::new(FakeBrowser::new(SERP_NEW_MARKUP).page(SEARCH_URL, HOME).hanging());
    let policy = Arc::new(SelectorPolicy::new(Default::default()));
    let mut config = test_config(vec![engine(&["#q"], &["h3 a"])]);
    config.fetch.http_timeout_secs = 1;
    let orchestrator =
        ResearchOrchestrator::new(config, Arc::clone(&policy), Arc::new(web()), browser.clone())
            .unwrap();

    let started = std::time::Instant::now();
    let run = orchestrator.research_with_diagnostics("tokio runtime").await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!run.budget_exhausted);
    assert!(run.outcome.is_no_results());
    let error = run.engines[0].error.as_deref().unwrap_or_default();
    assert!(error.contains("timed out"), "unexpected error: {}", error);
    assert_eq!(policy.value_of("mock", Role::SearchBox, "#q"), Some(0.0));
    assert_eq!(
        browser.launches.load(Ordering::SeqCst),
        browser.closes.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn report_respects_character_budget() {
    let browser = Arc::new(FakeBrowser::new(SERP_NEW_MARKUP).page(SEARCH_URL, HOME));
    let mut config = test_config(vec![engine(&["#q"], &["h3 a"])]);
    config.char_budget = 60;
    let orchestrator = ResearchOrchestrator::new(
        config,
        Arc::new(SelectorPolicy::new(Default::default())),
        Arc::new(web()),
        browser,
    )
    .unwrap();

    let outcome = orchestrator.research("tokio runtime tasks").await;
    let report = outcome.report().expect("report expected");
    assert_eq!(report.total_chars(), 60);
    assert_eq!(report.sections.len(), 1);
}

#[tokio::test]
async fn policy_state_is_persisted_after_each_run() {
    let path = temp_state_path("persist");
    let browser = Arc::new(FakeBrowser::new(SERP_NO_LINKS).page(SEARCH_URL, HOME));
    let mut config = test_config(vec![engine(&["#q"], &["li.result a"])]);
    config.state_path = Some(path.clone());

    let orchestrator = ResearchOrchestrator::new(
        config.clone(),
        Arc::new(SelectorPolicy::new(Default::default())),
        Arc::new(web()),
        browser.clone(),
    )
    .unwrap();
    orchestrator.research("anything").await;
    assert!(path.exists());

    // A fresh process picks up the learned values.
    let reloaded = Arc::new(SelectorPolicy::new(Default::default()));
    let _second =
        ResearchOrchestrator::new(config, Arc::clone(&reloaded), Arc::new(web()), browser).unwrap();
    assert!(reloaded.value_of("mock", Role::ResultList, "li.result a").unwrap() < 0.0);
    assert!(reloaded.value_of("mock", Role::SearchBox, "#q").unwrap() > 0.0);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn query_budget_keeps_partial_results() {
    let http = Arc::new(web().with_delay(Duration::from_secs(3)));
    let browser = Arc::new(FakeBrowser::new(SERP_NEW_MARKUP).page(SEARCH_URL, HOME));
    let mut config = test_config(vec![engine(&["#q"], &["h3 a"])]);
    config.query_budget_secs = 1;
    let orchestrator = ResearchOrchestrator::new(
        config,
        Arc::new(SelectorPolicy::new(Default::default())),
        http,
        browser,
    )
    .unwrap();

    let started = std::time::Instant::now();
    let run = orchestrator.research_with_diagnostics("tokio runtime").await;
    assert!(run.budget_exhausted);
    assert_eq!(run.result_urls.len(), 2);
    assert!(run.outcome.is_no_results());
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn configuration_errors_surface_before_any_network_activity() {
    let browser = Arc::new(FakeBrowser::new(SERP_NO_LINKS));
    let http = Arc::new(FakeHttp::new());

    let empty = test_config(Vec::new());
    let err = ResearchOrchestrator::new(
        empty,
        Arc::new(SelectorPolicy::new(Default::default())),
        http.clone(),
        browser.clone(),
    )
    .err()
    .expect("empty engine list must be rejected");
    assert!(matches!(err, ResearchError::Config(_)));

    let mut zero_budget = test_config(vec![engine(&["#q"], &["a"])]);
    zero_budget.char_budget = 0;
    assert!(ResearchOrchestrator::new(
        zero_budget,
        Arc::new(SelectorPolicy::new(Default::default())),
        http.clone(),
        browser.clone(),
    )
    .is_err());

    assert_eq!(http.total_calls(), 0);
    assert_eq!(browser.launches.load(Ordering::SeqCst), 0);
}
