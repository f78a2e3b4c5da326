mod common;

use common::LazyProvider;
use gitfleet::discovery::{discover, DiscoveryOptions};
use gitfleet::query::QueryPattern;

#[tokio::test]
async fn limit_stops_enumeration_across_organizations() {
    let provider = LazyProvider::new(3, 1000);
    let pattern = QueryPattern::parse("*/*/*").expect("valid query");
    let options = DiscoveryOptions {
        limit: Some(5),
        include_disabled: false,
    };

    let report = discover(&provider, &pattern, &options).await.expect("discovery runs");

    assert_eq!(report.repositories.len(), 5);
    assert!(report.limit_reached);
    // Only the first organization was opened, and its stream was not drained.
    assert_eq!(provider.listed(), vec!["org-0".to_string()]);
    assert_eq!(provider.produced(), 5);
}

#[tokio::test]
async fn repo_pattern_filters_without_limit() {
    let provider = LazyProvider::new(3, 300);
    let pattern = QueryPattern::parse("org-1/*/repo-000?").expect("valid query");

    let report = discover(&provider, &pattern, &DiscoveryOptions::default())
        .await
        .expect("discovery runs");

    let names: Vec<&str> = report
        .repositories
        .iter()
        .map(|r| r.repository.name.as_str())
        .collect();
    assert_eq!(names.len(), 10);
    assert!(names.iter().all(|n| n.starts_with("repo-000")));
    assert!(report.repositories.iter().all(|r| r.organization == "org-1"));
    assert_eq!(provider.listed(), vec!["org-1".to_string()]);
}

#[tokio::test]
async fn unlimited_discovery_returns_everything() {
    let provider = LazyProvider::new(3, 30);
    let report = discover(&provider, &QueryPattern::any(), &DiscoveryOptions::default())
        .await
        .expect("discovery runs");

    assert_eq!(report.repositories.len(), 30);
    assert!(!report.limit_reached);
    assert_eq!(provider.listed().len(), 3);

    let rows = report.rows();
    assert_eq!(rows[0].organization, "org-0");
    assert_eq!(rows[0].repository, "repo-0000");
    assert_eq!(rows[0].project, None);
}
