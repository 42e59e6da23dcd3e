//! Tests for firewall rule reconciliation

use std::collections::BTreeSet;
use std::sync::Arc;

use cluster_reconciler::api::models::{EntryState, FirewallRuleCreate, FirewallRuleType};
use cluster_reconciler::Error;

use crate::common::*;

fn tag(value: &str) -> FirewallRuleCreate {
    FirewallRuleCreate::new(FirewallRuleType::Tag, value)
}

fn as_set(rules: Vec<FirewallRuleCreate>) -> BTreeSet<FirewallRuleCreate> {
    rules.into_iter().collect()
}

fn setup() -> (Arc<FakeApi>, Arc<FakeRunner>) {
    let api = Arc::new(FakeApi::new());
    api.add_cluster(ClusterBuilder::new("app-db").build());
    api.add_rule("id-app-db", tag("web"));
    (api, Arc::new(FakeRunner::new()))
}

#[tokio::test]
async fn test_present_adds_missing_rules_once() {
    let (api, runner) = setup();
    let mut session = test_session(&api, &runner);
    let desired = vec![tag("web"), FirewallRuleCreate::ip_addr("10.0.0.5")];

    let outcome = session
        .reconcile_rules("app-db", &desired, EntryState::Present)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert_eq!(
        as_set(api.rules("id-app-db")),
        as_set(vec![tag("web"), FirewallRuleCreate::ip_addr("10.0.0.5")])
    );

    let again = session
        .reconcile_rules("app-db", &desired, EntryState::Present)
        .await
        .unwrap();
    assert!(!again.changed);
    assert_eq!(api.writes(), vec!["update_firewall_rules:id-app-db"]);
}

#[tokio::test]
async fn test_satisfied_rules_issue_no_update() {
    let (api, runner) = setup();
    let mut session = test_session(&api, &runner);

    let outcome = session
        .reconcile_rules("app-db", &[tag("web"), tag("web")], EntryState::Present)
        .await
        .unwrap();
    assert!(!outcome.changed);
    assert_eq!(api.write_count(), 0);
}

#[tokio::test]
async fn test_absent_removes_only_listed_rules() {
    let (api, runner) = setup();
    api.add_rule("id-app-db", FirewallRuleCreate::ip_addr("10.0.0.5"));
    let mut session = test_session(&api, &runner);

    let outcome = session
        .reconcile_rules(
            "app-db",
            &[FirewallRuleCreate::ip_addr("10.0.0.5")],
            EntryState::Absent,
        )
        .await
        .unwrap();
    assert!(outcome.changed);
    assert_eq!(api.rules("id-app-db"), vec![tag("web")]);

    let again = session
        .reconcile_rules(
            "app-db",
            &[FirewallRuleCreate::ip_addr("10.0.0.5")],
            EntryState::Absent,
        )
        .await
        .unwrap();
    assert!(!again.changed);
    assert_eq!(api.write_count(), 1);
}

#[tokio::test]
async fn test_unknown_cluster() {
    let (api, runner) = setup();
    let mut session = test_session(&api, &runner);

    let err = session
        .reconcile_rules("other-db", &[tag("web")], EntryState::Present)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ClusterNotFound(name) if name == "other-db"));
    assert_eq!(api.write_count(), 0);
}

// =============================================================================
// Droplets and self
// =============================================================================

#[tokio::test]
async fn test_allow_droplets_by_name() {
    let (api, runner) = setup();
    // Three pages of droplets with the default page size
    api.add_droplet(11, "web-1");
    api.add_droplet(12, "worker-1");
    api.add_droplet(13, "web-2");
    api.add_droplet(14, "bastion");
    api.add_droplet(15, "web-3");
    let mut session = test_session(&api, &runner);

    let names = vec!["web-1".to_string(), "web-3".to_string()];
    let outcome = session.allow_droplets("app-db", &names).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(
        as_set(api.rules("id-app-db")),
        as_set(vec![
            tag("web"),
            FirewallRuleCreate::droplet(11),
            FirewallRuleCreate::droplet(15),
        ])
    );

    let again = session.allow_droplets("app-db", &names).await.unwrap();
    assert!(!again.changed);
}

#[tokio::test]
async fn test_allow_droplets_rejects_unknown_names() {
    let (api, runner) = setup();
    api.add_droplet(11, "web-1");
    let mut session = test_session(&api, &runner);

    let names = vec![
        "web-1".to_string(),
        "ghost".to_string(),
        "another-ghost".to_string(),
    ];
    let err = session.allow_droplets("app-db", &names).await.unwrap_err();

    match err {
        Error::DropletsNotFound(missing) => {
            assert_eq!(missing, vec!["another-ghost", "ghost"]);
        }
        other => panic!("expected DropletsNotFound, got {:?}", other),
    }
    assert_eq!(api.write_count(), 0);
}

#[tokio::test]
async fn test_allow_self_is_permanent() {
    let (api, runner) = setup();
    let mut session = test_session(&api, &runner);

    let outcome = session.allow_self("app-db").await.unwrap();
    assert!(outcome.changed);
    assert!(
        api.rules("id-app-db")
            .contains(&FirewallRuleCreate::ip_addr(SELF_ADDRESS))
    );

    assert!(!session.allow_self("app-db").await.unwrap().changed);
}
