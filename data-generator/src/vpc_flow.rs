use rand::Rng;
use serde_json::{json, Value};

use crate::{pick, random_account_id};

pub(crate) struct VpcFlowPools {
    timestamp: String,
    account_ids: Vec<String>,
    regions: &'static [&'static str],
    actions: &'static [&'static str],
    statuses: &'static [&'static str],
    directions: &'static [&'static str],
    services: &'static [&'static str],
    ports: &'static [u16],
    ip_bases: &'static [&'static str],
}

impl VpcFlowPools {
    pub(crate) fn new(rng: &mut impl Rng, timestamp: String) -> Self {
        Self {
            timestamp,
            account_ids: (0..50).map(|_| random_account_id(rng)).collect(),
            regions: &["us-east-1", "us-west-2"],
            actions: &["ACCEPT", "REJECT"],
            statuses: &["OK", "NODATA"],
            directions: &["ingress", "egress"],
            services: &["S3", "EC2"],
            ports: &[22, 80, 443],
            ip_bases: &["172.31", "10.0"],
        }
    }

    fn private_ip(&self, rng: &mut impl Rng) -> String {
        format!(
            "{}.{}.{}",
            pick(rng, self.ip_bases),
            rng.gen_range(1..=255),
            rng.gen_range(1..=255)
        )
    }

    pub(crate) fn generate(&self, rng: &mut impl Rng) -> Value {
        json!({
            "@timestamp": self.timestamp.as_str(),
            "start_time": self.timestamp.as_str(),
            "end_time": self.timestamp.as_str(),
            "interval_start_time": self.timestamp.as_str(),
            "aws": {
                "vpc": {
                    "account-id": pick(rng, &self.account_ids),
                    "action": pick(rng, self.actions),
                    "bytes": rng.gen_range(64..=10_000u64),
                    "dstaddr": self.private_ip(rng),
                    "srcaddr": self.private_ip(rng),
                    "dstport": pick(rng, self.ports),
                    "srcport": rng.gen_range(1024..=65_535u16),
                    "packets": rng.gen_range(1..=100u32),
                    "region": pick(rng, self.regions),
                    "status_code": pick(rng, self.statuses),
                    "flow-direction": pick(rng, self.directions),
                    "pkt-dst-aws-service": pick(rng, self.services),
                    "version": 2
                }
            }
        })
    }
}
