// Integration tests for `VercelClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doorman_api::vercel::types::{
    Condition, ConditionGroup, CustomRule, FirewallConfigUpdate, IpRule, Mitigation, RuleAction,
};
use doorman_api::{RetryPolicy, TransportConfig, VercelClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(team: Option<&str>) -> (MockServer, VercelClient) {
    let server = MockServer::start().await;
    let transport = TransportConfig {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
    };
    let client = VercelClient::new(
        &server.uri(),
        &SecretString::from("vercel-token"),
        "prj_123",
        team.map(str::to_owned),
        &transport,
    )
    .unwrap();
    (server, client)
}

fn block_admin() -> CustomRule {
    CustomRule {
        id: None,
        name: "Block Admin".into(),
        description: String::new(),
        active: true,
        condition_group: vec![ConditionGroup {
            conditions: vec![Condition {
                kind: "path".into(),
                op: "pre".into(),
                neg: false,
                key: None,
                value: Some(json!("/admin")),
            }],
        }],
        action: RuleAction {
            mitigate: Some(Mitigation {
                action: "deny".into(),
                rate_limit: None,
                redirect: None,
                action_duration: None,
            }),
        },
    }
}

// ── Config reads ────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_active_config() {
    let (server, client) = setup(Some("team_9")).await;

    Mock::given(method("GET"))
        .and(path("/v1/security/firewall/config/active"))
        .and(query_param("projectId", "prj_123"))
        .and(query_param("teamId", "team_9"))
        .and(header("authorization", "Bearer vercel-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": {
                "version": 12,
                "updatedAt": "2026-03-01T10:00:00.000Z",
                "firewallEnabled": true,
                "rules": [{
                    "id": "rule_block_admin",
                    "name": "Block Admin",
                    "active": true,
                    "conditionGroup": [{ "conditions": [{ "type": "path", "op": "pre", "value": "/admin" }] }],
                    "action": { "mitigate": { "action": "deny" } }
                }],
                "ips": [{ "id": "ip1", "hostname": "*", "ip": "10.0.0.1", "action": "deny" }],
                "managedRules": { "owasp": { "active": false } }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = client.get_config(None).await.unwrap();

    assert_eq!(config.version, Some(12));
    assert_eq!(config.rules.len(), 1);
    assert_eq!(config.rules[0].id.as_deref(), Some("rule_block_admin"));
    assert_eq!(config.rules[0].condition_group[0].conditions[0].op, "pre");
    assert_eq!(config.ips[0].ip, "10.0.0.1");
    assert!(config.extra.contains_key("managedRules"));
}

#[tokio::test]
async fn test_get_historical_version_without_team() {
    let (server, client) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/v1/security/firewall/config/3"))
        .and(query_param("projectId", "prj_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": 3, "firewallEnabled": true, "rules": [], "ips": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = client.get_config(Some(3)).await.unwrap();
    assert_eq!(config.version, Some(3));
    assert!(config.rules.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert!(
        !requests[0].url.query().unwrap_or_default().contains("teamId"),
        "teamId must be omitted when unset"
    );
}

// ── Mutations ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_insert_rule_patch_body() {
    let (server, client) = setup(None).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/security/firewall/config"))
        .and(query_param("projectId", "prj_123"))
        .and(body_json(json!({
            "action": "rules.insert",
            "value": {
                "name": "Block Admin",
                "active": true,
                "conditionGroup": [{ "conditions": [{ "type": "path", "op": "pre", "value": "/admin" }] }],
                "action": { "mitigate": { "action": "deny" } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.insert_rule(&block_admin()).await.unwrap();
}

#[tokio::test]
async fn test_remove_and_update_ip_patch_bodies() {
    let (server, client) = setup(None).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/security/firewall/config"))
        .and(body_json(json!({ "action": "ip.remove", "id": "ip9" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/security/firewall/config"))
        .and(body_json(json!({
            "action": "ip.update",
            "id": "ip1",
            "value": { "hostname": "h", "ip": "10.0.0.1", "action": "deny" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.remove_ip("ip9").await.unwrap();
    client
        .update_ip(
            "ip1",
            &IpRule {
                id: None,
                hostname: "h".into(),
                ip: "10.0.0.1".into(),
                notes: None,
                action: "deny".into(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_put_config_replaces_everything() {
    let (server, client) = setup(None).await;

    Mock::given(method("PUT"))
        .and(path("/v1/security/firewall/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": { "version": 13, "firewallEnabled": true, "rules": [], "ips": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = client
        .put_config(&FirewallConfigUpdate {
            firewall_enabled: true,
            rules: vec![],
            ips: vec![],
        })
        .await
        .unwrap();
    assert_eq!(config.version, Some(13));
}

#[tokio::test]
async fn test_api_error_message_surfaces() {
    let (server, client) = setup(None).await;

    Mock::given(method("PATCH"))
        .and(path("/v1/security/firewall/config"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "invalid_request", "message": "rules[0].name is required" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.remove_rule("rule_x").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("rules[0].name is required"));
}
