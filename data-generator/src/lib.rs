//! Synthetic AWS log data for load-testing an OpenSearch cluster.
//!
//! Each supported log type has a generator that mirrors the document shape
//! produced by the corresponding AWS log delivery: pools of plausible values
//! are pre-generated once, then sampled per document so that high-volume
//! generation stays cheap. Documents are ingested through the cluster's
//! `_bulk` endpoint by a pool of concurrent workers; the Big5 corpus is not
//! synthesized but read from an NDJSON document file.

#![recursion_limit = "256"]

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use thiserror::Error;

use query_store::LogType;

pub mod bulk;
pub mod ingest;

mod cloudtrail;
mod network_firewall;
mod vpc_flow;
mod waf;

pub use bulk::{BulkClient, IngestError};
pub use ingest::{ingest_ndjson_file, run_generation, IngestPlan, IngestReport};

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("log type {0} has no synthetic generator, ingest it from a document file instead")]
    Unsupported(LogType),
}

/// Samples one element of a non-empty pool.
pub(crate) fn pick<'a, T>(rng: &mut impl Rng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

/// An IPv4 address drawn uniformly from the full space.
pub(crate) fn random_ip(rng: &mut impl Rng) -> String {
    format!(
        "{}.{}.{}.{}",
        rng.gen_range(1..=255),
        rng.gen_range(1..=255),
        rng.gen_range(1..=255),
        rng.gen_range(1..=255)
    )
}

/// A twelve-digit AWS account id.
pub(crate) fn random_account_id(rng: &mut impl Rng) -> String {
    rng.gen_range(100_000_000_000u64..=999_999_999_999).to_string()
}

/// A document source for one log type, sampling from pre-generated pools.
pub struct LogDocumentSource {
    log_type: LogType,
    inner: Source,
}

enum Source {
    VpcFlow(vpc_flow::VpcFlowPools),
    NetworkFirewall(network_firewall::NetworkFirewallPools),
    CloudTrail(cloudtrail::CloudTrailPools),
    Waf(waf::WafPools),
}

impl LogDocumentSource {
    pub fn new(log_type: LogType) -> Result<Self, GeneratorError> {
        let mut rng = SmallRng::from_entropy();
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
        let inner = match log_type {
            LogType::Vpc => Source::VpcFlow(vpc_flow::VpcFlowPools::new(&mut rng, timestamp)),
            LogType::Nfw => {
                Source::NetworkFirewall(network_firewall::NetworkFirewallPools::new(&mut rng, timestamp))
            }
            LogType::Cloudtrail => {
                Source::CloudTrail(cloudtrail::CloudTrailPools::new(&mut rng, timestamp))
            }
            LogType::Waf => Source::Waf(waf::WafPools::new(&mut rng, timestamp)),
            LogType::Big5 => return Err(GeneratorError::Unsupported(log_type)),
        };
        Ok(Self { log_type, inner })
    }

    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    /// Builds one document.
    pub fn generate(&self, rng: &mut impl Rng) -> Value {
        match &self.inner {
            Source::VpcFlow(pools) => pools.generate(rng),
            Source::NetworkFirewall(pools) => pools.generate(rng),
            Source::CloudTrail(pools) => pools.generate(rng),
            Source::Waf(pools) => pools.generate(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn big5_has_no_synthetic_generator() {
        assert!(matches!(
            LogDocumentSource::new(LogType::Big5),
            Err(GeneratorError::Unsupported(LogType::Big5))
        ));
    }

    #[test]
    fn vpc_documents_have_the_flow_log_shape() {
        let source = LogDocumentSource::new(LogType::Vpc).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let doc = source.generate(&mut rng);
        let flow = &doc["aws"]["vpc"];
        assert!(doc["@timestamp"].is_string());
        assert!(flow["account-id"].is_string());
        assert!(flow["bytes"].is_u64());
        assert!(flow["dstaddr"].is_string());
        assert!(matches!(flow["action"].as_str(), Some("ACCEPT" | "REJECT")));
    }

    #[test]
    fn network_firewall_documents_use_flat_field_names() {
        let source = LogDocumentSource::new(LogType::Nfw).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let doc = source.generate(&mut rng);
        assert!(doc["aws.networkfirewall.event.src_ip"].is_string());
        assert!(doc["aws.networkfirewall.event.netflow.bytes"].is_u64());
        assert!(doc["aws.networkfirewall.firewall_name"].is_string());
    }

    #[test]
    fn cloudtrail_documents_nest_the_event_record() {
        let source = LogDocumentSource::new(LogType::Cloudtrail).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let doc = source.generate(&mut rng);
        let trail = &doc["aws"]["cloudtrail"];
        assert_eq!(trail["eventVersion"], "1.08");
        assert!(trail["userIdentity"]["arn"].is_string());
        assert_eq!(doc["cloud"]["provider"], "aws");
    }

    #[test]
    fn waf_documents_carry_the_http_request() {
        let source = LogDocumentSource::new(LogType::Waf).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..32 {
            let doc = source.generate(&mut rng);
            let waf = &doc["aws"]["waf"];
            assert!(waf["httpRequest"]["clientIp"].is_string());
            assert!(waf["ruleGroupList"].is_array());
            let action = waf["action"].as_str().unwrap();
            // CAPTCHA and CHALLENGE actions must carry their response block.
            if action == "CAPTCHA" {
                assert!(waf["captchaResponse"].is_object());
            }
            if action == "CHALLENGE" {
                assert!(waf["challengeResponse"].is_object());
            }
        }
    }
}
