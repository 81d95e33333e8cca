// Integration tests for `CloudflareClient` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doorman_api::cloudflare::types::{AccessRule, AccessRuleTarget, AccessRuleUpdate, Rule};
use doorman_api::{CloudflareClient, Error, RetryPolicy, Scope, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(scope: Scope) -> (MockServer, CloudflareClient) {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        },
    };
    let base = format!("{}/client/v4", server.uri());
    let client =
        CloudflareClient::new(&base, &SecretString::from("cf-token"), scope, &transport).unwrap();
    (server, client)
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true, "errors": [], "messages": [], "result": result
    }))
}

fn ruleset(rules: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "rs1",
        "name": "default",
        "kind": "zone",
        "phase": "http_request_firewall_custom",
        "version": "4",
        "rules": rules
    })
}

// ── Rulesets ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_entrypoint_unwraps_envelope() {
    let (server, client) = setup(Scope::Zone("z1".into())).await;

    Mock::given(method("GET"))
        .and(path(
            "/client/v4/zones/z1/rulesets/phases/http_request_firewall_custom/entrypoint",
        ))
        .respond_with(ok(ruleset(json!([{
            "id": "r1",
            "version": "1",
            "action": "block",
            "expression": "(http.request.uri.path eq \"/admin\")",
            "description": "Block Admin",
            "enabled": true
        }]))))
        .expect(1)
        .mount(&server)
        .await;

    let ruleset = client.custom_rules_entrypoint().await.unwrap().unwrap();
    assert_eq!(ruleset.id, "rs1");
    assert_eq!(ruleset.rules.len(), 1);
    assert_eq!(ruleset.rules[0].description, "Block Admin");
}

#[tokio::test]
async fn test_missing_entrypoint_is_none_and_ensure_creates() {
    let (server, client) = setup(Scope::Account("acc1".into())).await;

    Mock::given(method("GET"))
        .and(path(
            "/client/v4/accounts/acc1/rulesets/phases/http_request_firewall_custom/entrypoint",
        ))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 10003, "message": "could not find entrypoint ruleset" }],
            "result": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/client/v4/accounts/acc1/rulesets"))
        .and(body_partial_json(json!({
            "kind": "root",
            "phase": "http_request_firewall_custom",
            "rules": []
        })))
        .respond_with(ok(ruleset(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.custom_rules_entrypoint().await.unwrap().is_none());
    let created = client.ensure_custom_ruleset().await.unwrap();
    assert_eq!(created.phase, "http_request_firewall_custom");
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_cloudflare_error() {
    let (server, client) = setup(Scope::Zone("z1".into())).await;

    Mock::given(method("GET"))
        .and(path("/client/v4/zones/z1/rulesets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 10000, "message": "Authentication error" }],
            "messages": [],
            "result": null
        })))
        .mount(&server)
        .await;

    let err = client.list_rulesets().await.unwrap_err();
    match err {
        Error::Cloudflare { code, message } => {
            assert_eq!(code, Some(10_000));
            assert_eq!(message, "Authentication error");
        }
        other => panic!("expected Cloudflare error, got {other:?}"),
    }
}

// ── Rules ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_rule_returns_ruleset_with_new_id() {
    let (server, client) = setup(Scope::Zone("z1".into())).await;

    Mock::given(method("POST"))
        .and(path("/client/v4/zones/z1/rulesets/rs1/rules"))
        .and(body_partial_json(json!({
            "action": "block",
            "description": "Block Admin",
            "enabled": true
        })))
        .respond_with(ok(ruleset(json!([{
            "id": "3f2a",
            "action": "block",
            "expression": "(http.request.uri.path eq \"/admin\")",
            "description": "Block Admin",
            "enabled": true
        }]))))
        .expect(1)
        .mount(&server)
        .await;

    let rule = Rule {
        id: None,
        action: "block".into(),
        expression: "(http.request.uri.path eq \"/admin\")".into(),
        description: "Block Admin".into(),
        enabled: true,
        action_parameters: None,
        version: None,
        last_updated: None,
    };
    let updated = client.add_rule("rs1", &rule).await.unwrap();
    assert_eq!(updated.rules[0].id.as_deref(), Some("3f2a"));
}

#[tokio::test]
async fn test_delete_rule_path() {
    let (server, client) = setup(Scope::Zone("z1".into())).await;

    Mock::given(method("DELETE"))
        .and(path("/client/v4/zones/z1/rulesets/rs1/rules/r9"))
        .respond_with(ok(ruleset(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client.delete_rule("rs1", "r9").await.unwrap();
    assert!(updated.rules.is_empty());
}

// ── IP access rules ─────────────────────────────────────────────────

#[tokio::test]
async fn test_list_access_rules_follows_pages() {
    let (server, client) = setup(Scope::Zone("z1".into())).await;

    let rule = |id: &str, ip: &str| {
        json!({
            "id": id,
            "mode": "block",
            "configuration": { "target": "ip", "value": ip },
            "notes": ""
        })
    };

    Mock::given(method("GET"))
        .and(path("/client/v4/zones/z1/firewall/access_rules/rules"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "errors": [], "messages": [],
            "result": [rule("a", "10.0.0.1")],
            "result_info": { "page": 1, "per_page": 100, "count": 1, "total_count": 2, "total_pages": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/client/v4/zones/z1/firewall/access_rules/rules"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "errors": [], "messages": [],
            "result": [rule("b", "10.0.0.2")],
            "result_info": { "page": 2, "per_page": 100, "count": 1, "total_count": 2, "total_pages": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rules = client.list_access_rules().await.unwrap();
    let ips: Vec<_> = rules.iter().map(|r| r.configuration.value.as_str()).collect();
    assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
}

#[tokio::test]
async fn test_access_rule_create_update_delete() {
    let (server, client) = setup(Scope::Zone("z1".into())).await;

    Mock::given(method("POST"))
        .and(path("/client/v4/zones/z1/firewall/access_rules/rules"))
        .and(body_partial_json(json!({
            "mode": "block",
            "configuration": { "target": "ip_range", "value": "10.0.0.0/24" }
        })))
        .respond_with(ok(json!({
            "id": "new1",
            "mode": "block",
            "configuration": { "target": "ip_range", "value": "10.0.0.0/24" },
            "notes": "office"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/client/v4/zones/z1/firewall/access_rules/rules/new1"))
        .and(body_partial_json(json!({ "mode": "whitelist" })))
        .respond_with(ok(json!({
            "id": "new1",
            "mode": "whitelist",
            "configuration": { "target": "ip_range", "value": "10.0.0.0/24" },
            "notes": ""
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/client/v4/zones/z1/firewall/access_rules/rules/new1"))
        .respond_with(ok(json!({ "id": "new1" })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client
        .create_access_rule(&AccessRule {
            id: None,
            mode: "block".into(),
            configuration: AccessRuleTarget {
                target: "ip_range".into(),
                value: "10.0.0.0/24".into(),
            },
            notes: "office".into(),
        })
        .await
        .unwrap();
    assert_eq!(created.id.as_deref(), Some("new1"));

    let updated = client
        .update_access_rule(
            "new1",
            &AccessRuleUpdate {
                mode: "whitelist".into(),
                notes: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.mode, "whitelist");

    client.delete_access_rule("new1").await.unwrap();
}
