use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{pick, random_account_id, random_ip};

fn hex_id(prefix: &str, len: usize) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..len])
}

pub(crate) struct NetworkFirewallPools {
    timestamp: String,
    firewall_names: Vec<String>,
    src_ips: Vec<String>,
    dest_ips: Vec<String>,
    interface_ids: Vec<String>,
    vpc_ids: Vec<String>,
    subnet_ids: Vec<String>,
    protocols: &'static [&'static str],
    app_protocols: &'static [&'static str],
    dest_ports: &'static [u16],
    actions: &'static [&'static str],
}

impl NetworkFirewallPools {
    pub(crate) fn new(rng: &mut impl Rng, timestamp: String) -> Self {
        Self {
            timestamp,
            firewall_names: (0..500).map(|i| format!("fw-{i}-{}", &Uuid::new_v4().simple().to_string()[..8])).collect(),
            src_ips: (0..1_000).map(|_| random_ip(rng)).collect(),
            dest_ips: (0..1_000).map(|_| random_ip(rng)).collect(),
            interface_ids: (0..200).map(|_| hex_id("eni", 16)).collect(),
            vpc_ids: (0..100).map(|_| hex_id("vpc", 16)).collect(),
            subnet_ids: (0..200).map(|_| hex_id("subnet", 16)).collect(),
            protocols: &["TCP", "UDP", "ICMP"],
            app_protocols: &["http", "https", "ssh", "ftp", "dns", "smtp", "unknown"],
            dest_ports: &[80, 443, 22, 21, 53, 25, 3389, 8080, 8443, 9200],
            actions: &["ALLOW", "DROP", "REJECT", "ALERT"],
        }
    }

    pub(crate) fn generate(&self, rng: &mut impl Rng) -> Value {
        json!({
            "aws.networkfirewall.firewall_name": pick(rng, &self.firewall_names),
            "aws.networkfirewall.event.timestamp": self.timestamp.as_str(),
            "aws.networkfirewall.event.src_ip": pick(rng, &self.src_ips),
            "aws.networkfirewall.event.dest_ip": pick(rng, &self.dest_ips),
            "aws.networkfirewall.event.src_port": rng.gen_range(1024..=65_535u16),
            "aws.networkfirewall.event.dest_port": pick(rng, self.dest_ports),
            "aws.networkfirewall.event.proto": pick(rng, self.protocols),
            "aws.networkfirewall.event.app_proto": pick(rng, self.app_protocols),
            "aws.networkfirewall.event.tcp.tcp_flags": rng.gen_range(0..=255u16).to_string(),
            "aws.networkfirewall.event.tcp.syn": rng.gen_bool(0.5),
            "aws.networkfirewall.event.tcp.ack": rng.gen_bool(0.5),
            "aws.networkfirewall.event.tcp.fin": rng.gen_bool(0.5),
            "aws.networkfirewall.event.tcp.rst": rng.gen_bool(0.5),
            "aws.networkfirewall.event.netflow.pkts": rng.gen_range(1..=10_000u32),
            "aws.networkfirewall.event.netflow.bytes": rng.gen_range(64..=1_048_576u64),
            "aws.networkfirewall.event.netflow.age": rng.gen_range(1..=3_600u32),
            "aws.networkfirewall.event.netflow.start": self.timestamp.as_str(),
            "aws.networkfirewall.event.netflow.end": self.timestamp.as_str(),
            "aws.networkfirewall.event.action": pick(rng, self.actions),
            "aws.networkfirewall.event.rule_group_name": format!("rulegroup-{}", rng.gen_range(1_000..=9_999u32)),
            "aws.networkfirewall.event.rule_name": format!("rule-{}", rng.gen_range(10_000..=99_999u32)),
            "aws.networkfirewall.event.rule_priority": rng.gen_range(1..=65_535u32),
            "aws.networkfirewall.event.signature_id": rng.gen_range(1_000_000..=9_999_999u32),
            "aws.networkfirewall.event.signature_rev": rng.gen_range(1..=100u32),
            "aws.networkfirewall.event.category": *pick(rng, &["Malware", "Trojan", "Policy Violation", "Suspicious Activity"]),
            "aws.networkfirewall.event.severity": rng.gen_range(1..=4u8),
            "aws.networkfirewall.interface_id": pick(rng, &self.interface_ids),
            "aws.networkfirewall.vpc_id": pick(rng, &self.vpc_ids),
            "aws.networkfirewall.subnet_id": pick(rng, &self.subnet_ids),
            "aws.networkfirewall.availability_zone": *pick(rng, &["us-east-1a", "us-east-1b", "us-west-2a", "us-west-2b"]),
            "aws.networkfirewall.account_id": random_account_id(rng),
            "aws.networkfirewall.region": *pick(rng, &["us-east-1", "us-west-2", "eu-west-1", "ap-northeast-1"]),
            "aws.networkfirewall.event.flow_id": format!("flow-{}", rng.gen_range(100_000_000..=999_999_999u64)),
            "aws.networkfirewall.event.event_id": format!("event-{}", rng.gen_range(100_000_000..=999_999_999u64)),
            "aws.networkfirewall.event.classification": *pick(rng, &["Attempted Information Leak", "Web Application Attack", "Trojan Activity"]),
            "aws.networkfirewall.event.reference": format!("http://www.emergingthreats.net/sid/{}", rng.gen_range(2_000_000..=2_999_999u32)),
            "aws.networkfirewall.event.geoip.src_country": *pick(rng, &["US", "CN", "RU", "DE", "GB", "FR", "JP"]),
            "aws.networkfirewall.event.geoip.dest_country": *pick(rng, &["US", "CA", "GB", "DE", "FR"]),
            "aws.networkfirewall.event.http.hostname": format!("host-{}.example.com", rng.gen_range(1_000..=9_999u32)),
            "aws.networkfirewall.event.http.url": format!(
                "/api/v{}/{}/{}",
                rng.gen_range(1..=3u8),
                *pick(rng, &["users", "data", "files"]),
                &Uuid::new_v4().simple().to_string()[..16]
            ),
            "aws.networkfirewall.event.http.user_agent": *pick(rng, &[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
                "curl/7.68.0",
                "Python-urllib/3.9",
                "Go-http-client/1.1",
            ]),
            "aws.networkfirewall.event.http.method": *pick(rng, &["GET", "POST", "PUT", "DELETE"]),
            "aws.networkfirewall.event.http.status": *pick(rng, &[200u16, 404, 403, 500, 502]),
            "aws.networkfirewall.event.dns.query": format!(
                "{}.{}.{}",
                *pick(rng, &["api", "www", "mail", "ftp"]),
                *pick(rng, &["example", "test", "demo"]),
                *pick(rng, &["com", "org", "net"])
            ),
            "aws.networkfirewall.event.dns.type": *pick(rng, &["A", "AAAA", "CNAME", "MX", "TXT"]),
            "aws.networkfirewall.event.tls.sni": format!("secure-{}.example.com", rng.gen_range(1_000..=9_999u32)),
            "aws.networkfirewall.event.tls.version": *pick(rng, &["TLSv1.2", "TLSv1.3"]),
            "aws.networkfirewall.event.tls.cipher": *pick(rng, &[
                "TLS_AES_256_GCM_SHA384",
                "TLS_CHACHA20_POLY1305_SHA256",
                "ECDHE-RSA-AES256-GCM-SHA384",
            ])
        })
    }
}
