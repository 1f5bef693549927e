use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{pick, random_account_id, random_ip};

pub(crate) struct CloudTrailPools {
    timestamp: String,
    account_ids: Vec<String>,
    user_names: Vec<String>,
    source_ips: Vec<String>,
    event_sources: &'static [&'static str],
    s3_events: &'static [&'static str],
    other_events: &'static [&'static str],
    regions: &'static [&'static str],
    user_agents: &'static [&'static str],
    api_versions: &'static [&'static str],
}

impl CloudTrailPools {
    pub(crate) fn new(rng: &mut impl Rng, timestamp: String) -> Self {
        Self {
            timestamp,
            account_ids: (0..100).map(|_| random_account_id(rng)).collect(),
            user_names: (0..500)
                .map(|i| format!("user-{i}-{}", &Uuid::new_v4().simple().to_string()[..8]))
                .collect(),
            source_ips: (0..1_000).map(|_| random_ip(rng)).collect(),
            event_sources: &[
                "s3.amazonaws.com",
                "dynamodb.amazonaws.com",
                "lambda.amazonaws.com",
                "ec2.amazonaws.com",
                "iam.amazonaws.com",
            ],
            s3_events: &["GetObject", "PutObject", "DeleteObject", "HeadObject", "CopyObject"],
            other_events: &["RunInstances", "TerminateInstances", "CreateUser", "DeleteUser"],
            regions: &[
                "us-east-1",
                "us-west-2",
                "eu-west-1",
                "ap-northeast-1",
                "ap-southeast-1",
            ],
            user_agents: &[
                "aws-cli/2.13.0",
                "aws-sdk-java/1.12.529",
                "Boto3/1.28.25",
                "S3Console/0.4",
            ],
            api_versions: &["2006-03-01", "2012-08-10", "2015-03-31"],
        }
    }

    pub(crate) fn generate(&self, rng: &mut impl Rng) -> Value {
        let event_source = *pick(rng, self.event_sources);
        let account_id = pick(rng, &self.account_ids).as_str();
        let region = *pick(rng, self.regions);
        let event_name = if event_source == "s3.amazonaws.com" {
            *pick(rng, self.s3_events)
        } else {
            *pick(rng, self.other_events)
        };
        let service = event_source.split('.').next().unwrap_or_default();

        json!({
            "@timestamp": self.timestamp.as_str(),
            "event": {
                "result": *pick(rng, &["ACCEPT", "REJECT"]),
                "name": "cloud_trail",
                "domain": "cloudtrail"
            },
            "cloud": {
                "provider": "aws",
                "account": { "id": account_id },
                "region": region,
                "resource_id": format!("i-{:x}", rng.gen_range(100_000_000_000u64..=999_999_999_999)),
                "platform": "aws_ec2"
            },
            "aws": {
                "cloudtrail": {
                    "eventVersion": "1.08",
                    "eventName": event_name,
                    "eventSource": event_source,
                    "eventTime": self.timestamp.as_str(),
                    "eventType": "AwsApiCall",
                    "eventCategory": *pick(rng, &["Data", "Management"]),
                    "sourceIPAddress": pick(rng, &self.source_ips),
                    "userAgent": *pick(rng, self.user_agents),
                    "requestID": format!("req-{}-{}", rng.gen_range(100_000_000..=999_999_999u64), *pick(rng, &["abcd", "efgh", "ijkl"])),
                    "eventID": format!("evt-{}-{}", rng.gen_range(100_000_000..=999_999_999u64), *pick(rng, &["wxyz", "mnop", "qrst"])),
                    "awsRegion": region,
                    "recipientAccountId": account_id,
                    "apiVersion": *pick(rng, self.api_versions),
                    "readOnly": rng.gen_bool(0.5),
                    "userIdentity": {
                        "type": *pick(rng, &["IAMUser", "AssumedRole", "Root"]),
                        "principalId": format!("AIDA{}", rng.gen_range(100_000_000_000u64..=999_999_999_999)),
                        "arn": format!("arn:aws:iam::{account_id}:user/{}", pick(rng, &self.user_names)),
                        "accountId": account_id,
                        "accessKeyId": format!("AKIA{}", rng.gen_range(100_000_000_000u64..=999_999_999_999))
                    },
                    "resources": [{
                        "accountId": account_id,
                        "type": format!("AWS::{}::Object", service.to_uppercase()),
                        "ARN": format!("arn:aws:{service}:{region}:{account_id}:resource/{}", rng.gen_range(100_000..=999_999u32))
                    }]
                }
            }
        })
    }
}
