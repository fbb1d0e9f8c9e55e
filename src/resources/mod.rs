use serde_json::{json, Value};

use crate::error::{Error, Result};

mod policy;
pub use policy::*;
mod kms;
pub use kms::*;
mod s3_bucket;
pub use s3_bucket::*;
mod route53;
pub use route53::*;
mod acm;
pub use acm::*;
mod cloudfront;
pub use cloudfront::*;

/// hosted zone id used by every alias record that targets a CloudFront distribution.
/// see: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// managed "CachingOptimized" policy.
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// what kind of AWS resource a logical id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Key,
    Bucket,
    HostedZone,
    Certificate,
    OriginAccessIdentity,
    Distribution,
    RecordSet,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Key => "kms key",
            ResourceKind::Bucket => "s3 bucket",
            ResourceKind::HostedZone => "hosted zone",
            ResourceKind::Certificate => "certificate",
            ResourceKind::OriginAccessIdentity => "origin access identity",
            ResourceKind::Distribution => "cloudfront distribution",
            ResourceKind::RecordSet => "record set",
        };
        f.write_str(s)
    }
}

macro_rules! resource_handle {
    ($name:ident, $kind:expr) => {
        /// handle to a declared resource. holds its logical id.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub const KIND: ResourceKind = $kind;

            pub fn from_logical_id(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn logical_id(&self) -> &str {
                &self.0
            }

            pub fn reference(&self) -> Reference {
                Reference { logical_id: self.0.clone(), kind: Self::KIND }
            }
        }
    };
}

resource_handle!(KeyRef, ResourceKind::Key);
resource_handle!(BucketRef, ResourceKind::Bucket);
resource_handle!(ZoneRef, ResourceKind::HostedZone);
resource_handle!(CertificateRef, ResourceKind::Certificate);
resource_handle!(IdentityRef, ResourceKind::OriginAccessIdentity);
resource_handle!(DistributionRef, ResourceKind::Distribution);
resource_handle!(RecordRef, ResourceKind::RecordSet);

/// an edge from one declaration to another, along with the kind the target must be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub logical_id: String,
    pub kind: ResourceKind,
}

/// a single CloudFormation resource declaration.
pub trait CfnResource {
    fn logical_id(&self) -> &str;
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    /// every other declared resource this one points to.
    fn references(&self) -> Vec<Reference> {
        vec![]
    }
    /// `Retain` for resources that hold data.
    fn deletion_policy(&self) -> Option<&'static str> {
        None
    }
}

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// `arn:<partition>:iam::<account>:root`
pub fn account_root_arn() -> Value {
    sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:root")
}

pub fn verify_resource_name(resource_name: &str) -> Result<()> {
    if resource_name.len() > 255 {
        return Err(Error::invalid_name(resource_name, "must be less than 255 characters"));
    }
    if resource_name.is_empty() {
        return Err(Error::invalid_name(resource_name, "Must contain at least 1 character"));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::invalid_name(resource_name, "Must contain only alphanumeric characters [A-Za-z0-9]"));
    }
    Ok(())
}

/// turn a construct id such as `s3-bucket` into a CloudFormation logical id (`s3bucket`).
pub fn logical_id(construct_id: &str) -> Result<String> {
    let id: String = construct_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    verify_resource_name(&id).map_err(|_| {
        Error::invalid_name(construct_id, "Construct id must contain at least one alphanumeric character and at most 255")
    })?;
    Ok(id)
}

/// fully qualified domain name without trailing dot. allows one leading `*` label.
pub fn verify_domain_name(domain: &str) -> Result<()> {
    let rule = "Must be a fully qualified domain name (eg: mysite.com), must not end with '.', and may only contain one wildcard as its first label (eg: *.mysite.com)";
    if domain.is_empty() || domain.len() > 253 || domain.ends_with('.') {
        return Err(Error::invalid_name(domain, rule));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::invalid_name(domain, rule));
    }
    for (i, label) in labels.iter().enumerate() {
        if *label == "*" && i == 0 {
            continue;
        }
        let ok = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !ok {
            return Err(Error::invalid_name(domain, rule));
        }
    }
    Ok(())
}

/// true if `pattern` (a domain, possibly `*.parent`) names `domain`.
pub fn domain_covers(pattern: &str, domain: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    if pattern == domain {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(parent) => match domain.split_once('.') {
            Some((first, rest)) => !first.is_empty() && first != "*" && rest == parent,
            None => false,
        },
        None => false,
    }
}

/// true if `domain` is `zone` itself or one of its subdomains.
pub fn in_zone(zone: &str, domain: &str) -> bool {
    let zone = zone.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == zone || domain.ends_with(&format!(".{zone}"))
}
