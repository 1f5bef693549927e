use rand::Rng;
use serde_json::{json, Map, Value};

use crate::{pick, random_account_id, random_ip};

pub(crate) struct WafPools {
    timestamp: String,
    account_ids: Vec<String>,
    actions: &'static [&'static str],
    methods: &'static [&'static str],
    uris: &'static [&'static str],
    countries: &'static [&'static str],
    rule_types: &'static [&'static str],
    user_agents: &'static [&'static str],
    response_codes: &'static [u16],
}

impl WafPools {
    pub(crate) fn new(rng: &mut impl Rng, timestamp: String) -> Self {
        Self {
            timestamp,
            account_ids: (0..100).map(|_| random_account_id(rng)).collect(),
            actions: &["ALLOW", "BLOCK", "COUNT", "CAPTCHA", "CHALLENGE"],
            methods: &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"],
            uris: &[
                "/api/v1/users",
                "/api/v1/orders",
                "/api/v1/products",
                "/health",
                "/admin",
                "/login",
                "/search",
            ],
            countries: &["US", "GB", "DE", "FR", "JP", "CA", "AU", "BR", "IN"],
            rule_types: &["REGULAR", "RATE_BASED", "GROUP"],
            user_agents: &[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
                "curl/7.68.0",
                "Python-urllib/3.9",
            ],
            response_codes: &[200, 201, 204, 403, 503],
        }
    }

    fn rule_group_list(&self, rng: &mut impl Rng) -> Value {
        let mut groups = Vec::new();
        for _ in 0..rng.gen_range(1..=3) {
            let terminating_rule = if rng.gen_bool(0.3) {
                json!({
                    "ruleId": format!("rule-{}", rng.gen_range(10_000..=99_999u32)),
                    "action": *pick(rng, &["BLOCK", "ALLOW", "COUNT"]),
                    "ruleMatchDetails": [{
                        "conditionType": *pick(rng, &["SQL_INJECTION", "XSS", "SIZE_CONSTRAINT"]),
                        "location": *pick(rng, &["HEADER", "QUERY_STRING", "URI"]),
                        "matchedData": [*pick(rng, &["select", "script", "union", "drop"])]
                    }]
                })
            } else {
                Value::Null
            };

            let mut non_terminating = Vec::new();
            if rng.gen_bool(0.5) {
                for _ in 0..rng.gen_range(1..=2) {
                    non_terminating.push(json!({
                        "ruleId": format!("rule-{}", rng.gen_range(10_000..=99_999u32)),
                        "action": "COUNT",
                        "ruleMatchDetails": []
                    }));
                }
            }

            groups.push(json!({
                "ruleGroupId": format!("rulegroup-{}", rng.gen_range(100_000..=999_999u32)),
                "terminatingRule": terminating_rule,
                "nonTerminatingMatchingRules": non_terminating,
                "excludedRules": []
            }));
        }
        Value::Array(groups)
    }

    fn labels(&self, rng: &mut impl Rng) -> Value {
        let mut labels = Vec::new();
        if rng.gen_bool(0.4) {
            let names = [
                "awswaf:managed:aws:core-rule-set",
                "awswaf:managed:aws:known-bad-inputs",
            ];
            for _ in 0..rng.gen_range(1..=2) {
                labels.push(json!({ "name": *pick(rng, &names) }));
            }
        }
        Value::Array(labels)
    }

    fn rate_based_rule_list(&self, rng: &mut impl Rng) -> Value {
        let mut rules = Vec::new();
        if rng.gen_bool(0.2) {
            rules.push(json!({
                "rateBasedRuleId": format!("rate-rule-{}", rng.gen_range(10_000..=99_999u32)),
                "rateBasedRuleName": format!("RateLimitRule{}", rng.gen_range(1..=5u8)),
                "limitKey": *pick(rng, &["IP", "FORWARDED_IP"]),
                "maxRateAllowed": *pick(rng, &[100u32, 500, 1_000, 2_000]),
                "evaluationWindowSec": *pick(rng, &[60u32, 120, 300]),
                "limitValue": random_ip(rng)
            }));
        }
        Value::Array(rules)
    }

    fn challenge_outcome(&self, rng: &mut impl Rng, failure_reason: &str) -> Value {
        json!({
            "responseCode": *pick(rng, &[200u16, 405]),
            "solveTimestamp": rng.gen_range(1_600_000_000_000i64..=1_800_000_000_000),
            "failureReason": if rng.gen_bool(0.3) { Value::from(failure_reason) } else { Value::Null }
        })
    }

    pub(crate) fn generate(&self, rng: &mut impl Rng) -> Value {
        let action = *pick(rng, self.actions);
        let method = *pick(rng, self.methods);
        let host = format!("api{}.example.com", rng.gen_range(1..=5u8));

        let mut waf = json!({
            "formatVersion": 1,
            "webaclId": format!(
                "arn:aws:wafv2:us-east-1:{}:regional/webacl/waf-{}/{}",
                pick(rng, &self.account_ids),
                rng.gen_range(100_000..=999_999u32),
                rng.gen_range(10_000_000..=99_999_999u32)
            ),
            "terminatingRuleId": if action != "ALLOW" {
                format!("rule-{}", rng.gen_range(10_000..=99_999u32))
            } else {
                "Default_Action".to_owned()
            },
            "terminatingRuleType": if action != "ALLOW" { *pick(rng, self.rule_types) } else { "REGULAR" },
            "action": action,
            "httpSourceName": format!("CF-{}", rng.gen_range(1_000..=9_999u32)),
            "httpSourceId": format!("source-{}", rng.gen_range(100_000..=999_999u32)),
            "ruleGroupList": self.rule_group_list(rng),
            "rateBasedRuleList": self.rate_based_rule_list(rng),
            "responseCodeSent": *pick(rng, self.response_codes),
            "httpRequest": {
                "clientIp": random_ip(rng),
                "country": *pick(rng, self.countries),
                "headers": [
                    { "name": "Host", "value": host.as_str() },
                    { "name": "User-Agent", "value": *pick(rng, self.user_agents) },
                    { "name": "Accept", "value": "application/json" }
                ],
                "uri": *pick(rng, self.uris),
                "args": format!("page={}&limit={}", rng.gen_range(1..=10u8), *pick(rng, &[10u8, 20, 50, 100])),
                "httpVersion": "HTTP/1.1",
                "httpMethod": method,
                "requestId": format!("req-{}-{}", rng.gen_range(100_000_000..=999_999_999u64), *pick(rng, &["abcd", "efgh", "ijkl"])),
                "scheme": "https",
                "host": host.as_str()
            },
            "labels": self.labels(rng),
            "requestBodySize": rng.gen_range(0..=8_192u32),
            "requestBodySizeInspectedByWAF": rng.gen_range(0..=8_192u32),
            "ja3Fingerprint": format!("{}{}{}", rng.gen_range(10_000..=99_999u32), *pick(rng, &["a", "b", "c", "d", "e"]), rng.gen_range(10_000..=99_999u32)),
            "ja4Fingerprint": format!("ja4_{}{}", rng.gen_range(10_000..=99_999u32), *pick(rng, &["x", "y", "z"])),
            "clientAsn": rng.gen_range(1_000..=65_535u32),
            "forwardedAsn": if rng.gen_bool(0.5) { Value::from(rng.gen_range(1_000..=65_535u32)) } else { Value::Null }
        });

        if let Some(fields) = waf.as_object_mut() {
            match action {
                "CAPTCHA" => {
                    fields.insert(
                        "captchaResponse".to_owned(),
                        self.challenge_outcome(rng, "TOKEN_EXPIRED"),
                    );
                }
                "CHALLENGE" => {
                    fields.insert(
                        "challengeResponse".to_owned(),
                        self.challenge_outcome(rng, "TOKEN_INVALID"),
                    );
                }
                _ => {}
            }
        }

        let mut doc = Map::new();
        doc.insert("@timestamp".to_owned(), Value::from(self.timestamp.as_str()));
        doc.insert("aws".to_owned(), json!({ "waf": waf }));
        Value::Object(doc)
    }
}
