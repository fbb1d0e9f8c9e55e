use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::grants::{policy_logical_id, BucketPolicy, Grant};
use crate::regions::verify_region;
use crate::resources::*;
use crate::template::{ResourceOutput, Template, TemplateResource};

mod graph;
pub use graph::*;
mod validate;

pub const DEFAULT_REGION: &str = "us-east-1";

/// one entry of the stack, in the order it was declared.
#[derive(Debug, Clone)]
pub enum Declaration {
    Key(Key),
    Bucket(Bucket),
    HostedZone(HostedZone),
    Certificate(Certificate),
    Identity(OriginAccessIdentity),
    Distribution(Distribution),
    Record(RecordSet),
    Grant(Grant),
}

impl Declaration {
    pub fn node_id(&self) -> String {
        match self.as_resource() {
            Some(r) => r.logical_id().to_string(),
            None => match self {
                Declaration::Grant(g) => g.node_id(),
                _ => String::new(),
            },
        }
    }

    /// `None` for grants, which are not resources of their own.
    pub fn kind(&self) -> Option<ResourceKind> {
        Some(match self {
            Declaration::Key(_) => ResourceKind::Key,
            Declaration::Bucket(_) => ResourceKind::Bucket,
            Declaration::HostedZone(_) => ResourceKind::HostedZone,
            Declaration::Certificate(_) => ResourceKind::Certificate,
            Declaration::Identity(_) => ResourceKind::OriginAccessIdentity,
            Declaration::Distribution(_) => ResourceKind::Distribution,
            Declaration::Record(_) => ResourceKind::RecordSet,
            Declaration::Grant(_) => return None,
        })
    }

    pub fn as_resource(&self) -> Option<&dyn CfnResource> {
        match self {
            Declaration::Key(r) => Some(r),
            Declaration::Bucket(r) => Some(r),
            Declaration::HostedZone(r) => Some(r),
            Declaration::Certificate(r) => Some(r),
            Declaration::Identity(r) => Some(r),
            Declaration::Distribution(r) => Some(r),
            Declaration::Record(r) => Some(r),
            Declaration::Grant(_) => None,
        }
    }

    pub fn references(&self) -> Vec<Reference> {
        match self {
            Declaration::Grant(g) => g.references(),
            other => other.as_resource().map(|r| r.references()).unwrap_or_default(),
        }
    }
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let starts_ok = stack_name.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    if !starts_ok
        || stack_name.len() > 128
        || !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(Error::invalid_name(stack_name, restriction));
    }
    Ok(())
}

/// stack name from something like a crate or module name: `_` becomes `-`, cut to 128.
pub fn derive_stack_name(name: &str) -> Result<String> {
    let stack_name: String = name.replace('_', "-").chars().take(128).collect();
    validate_stack_name(&stack_name)?;
    Ok(stack_name)
}

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    region: String,
    description: Option<String>,
    declarations: Vec<Declaration>,
    outputs: Vec<(String, ResourceOutput)>,
}

impl Stack {
    pub fn new(name: &str, region: &str) -> Result<Self> {
        validate_stack_name(name)?;
        verify_region(region)?;
        Ok(Self {
            name: name.to_string(),
            region: region.to_string(),
            description: None,
            declarations: vec![],
            outputs: vec![],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = Some(description.to_string());
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn get(&self, node_id: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.node_id() == node_id)
    }

    fn declare(&mut self, decl: Declaration) -> Result<()> {
        let id = decl.node_id();
        if self.get(&id).is_some() {
            return Err(Error::DuplicateResource(id));
        }
        tracing::debug!(stack = %self.name, node = %id, "declared");
        self.declarations.push(decl);
        Ok(())
    }

    pub fn add_key(&mut self, key: Key) -> Result<KeyRef> {
        let r = KeyRef::from_logical_id(&key.logical_id);
        self.declare(Declaration::Key(key))?;
        Ok(r)
    }

    pub fn add_bucket(&mut self, bucket: Bucket) -> Result<BucketRef> {
        let r = BucketRef::from_logical_id(&bucket.logical_id);
        self.declare(Declaration::Bucket(bucket))?;
        Ok(r)
    }

    pub fn add_hosted_zone(&mut self, zone: HostedZone) -> Result<ZoneRef> {
        let r = ZoneRef::from_logical_id(&zone.logical_id);
        self.declare(Declaration::HostedZone(zone))?;
        Ok(r)
    }

    pub fn add_certificate(&mut self, cert: Certificate) -> Result<CertificateRef> {
        let r = CertificateRef::from_logical_id(&cert.logical_id);
        self.declare(Declaration::Certificate(cert))?;
        Ok(r)
    }

    pub fn add_origin_access_identity(&mut self, identity: OriginAccessIdentity) -> Result<IdentityRef> {
        let r = IdentityRef::from_logical_id(&identity.logical_id);
        self.declare(Declaration::Identity(identity))?;
        Ok(r)
    }

    pub fn add_distribution(&mut self, distribution: Distribution) -> Result<DistributionRef> {
        let r = DistributionRef::from_logical_id(&distribution.logical_id);
        self.declare(Declaration::Distribution(distribution))?;
        Ok(r)
    }

    pub fn add_record_set(&mut self, record: RecordSet) -> Result<RecordRef> {
        let r = RecordRef::from_logical_id(&record.logical_id);
        self.declare(Declaration::Record(record))?;
        Ok(r)
    }

    /// granting the same pair twice is a no-op.
    pub fn grant_read(&mut self, bucket: &BucketRef, identity: &IdentityRef) -> Result<()> {
        self.grant(Grant::Read { bucket: bucket.clone(), grantee: identity.clone() })
    }

    pub fn grant_decrypt(&mut self, key: &KeyRef, identity: &IdentityRef) -> Result<()> {
        self.grant(Grant::Decrypt { key: key.clone(), grantee: identity.clone() })
    }

    fn grant(&mut self, grant: Grant) -> Result<()> {
        if self.grants().any(|g| g == &grant) {
            return Ok(());
        }
        self.declare(Declaration::Grant(grant))
    }

    pub fn add_output(&mut self, name: &str, description: &str, value: Value) -> Result<()> {
        verify_resource_name(name)?;
        if self.outputs.iter().any(|(n, _)| n == name) {
            return Err(Error::DuplicateResource(format!("output {name}")));
        }
        self.outputs.push((name.to_string(), ResourceOutput { description: description.to_string(), value }));
        Ok(())
    }

    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Grant(g) => Some(g),
            _ => None,
        })
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Bucket(b) => Some(b),
            _ => None,
        })
    }

    pub fn distributions(&self) -> impl Iterator<Item = &Distribution> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Distribution(x) => Some(x),
            _ => None,
        })
    }

    pub fn bucket(&self, logical_id: &str) -> Option<&Bucket> {
        self.buckets().find(|b| b.logical_id == logical_id)
    }

    pub fn distribution(&self, logical_id: &str) -> Option<&Distribution> {
        self.distributions().find(|d| d.logical_id == logical_id)
    }

    pub fn certificate(&self, logical_id: &str) -> Option<&Certificate> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::Certificate(c) if c.logical_id == logical_id => Some(c),
            _ => None,
        })
    }

    pub fn zone_name(&self, zone: &ZoneRef) -> Option<&str> {
        self.declarations.iter().find_map(|d| match d {
            Declaration::HostedZone(z) if z.logical_id == zone.logical_id() => Some(z.zone_name.as_str()),
            _ => None,
        })
    }

    /// every structural check. returns the order the provisioning engine can create things in.
    pub fn validate(&self) -> Result<DependencyOrder> {
        let graph = DependencyGraph::build(self)?;
        let order = graph.topological_order()?;
        validate::check_domains(self)?;
        validate::check_certificate_region(self)?;
        validate::check_generated_ids(self)?;
        validate::check_outputs(self)?;
        validate::warn_missing_grants(self);
        if !order.declaration_order_is_topological {
            tracing::debug!(stack = %self.name, "declaration order is not a dependency order, resources will be reordered");
        }
        Ok(order)
    }

    pub fn synthesize(&self) -> Result<Template> {
        self.validate()?;
        let mut template = Template {
            description: self.description.clone(),
            ..Default::default()
        };

        let mut key_statements: BTreeMap<String, Vec<PolicyStatement>> = BTreeMap::new();
        let mut bucket_policies: BTreeMap<String, BucketPolicy> = BTreeMap::new();
        for grant in self.grants() {
            match grant {
                Grant::Read { bucket, .. } => {
                    bucket_policies
                        .entry(bucket.logical_id().to_string())
                        .or_insert_with(|| BucketPolicy::for_bucket(bucket))
                        .statements
                        .push(grant.statement());
                }
                Grant::Decrypt { key, .. } => {
                    key_statements.entry(key.logical_id().to_string()).or_default().push(grant.statement());
                }
            }
        }

        for decl in &self.declarations {
            let (id, resource) = match decl {
                Declaration::Grant(_) => continue,
                Declaration::Key(key) => {
                    let mut key = key.clone();
                    if let Some(extra) = key_statements.remove(&key.logical_id) {
                        key.extra_statements.extend(extra);
                    }
                    (key.logical_id.clone(), TemplateResource::from_resource(&key))
                }
                Declaration::Record(record) => {
                    let zone_name = self.zone_name(&record.zone).unwrap_or_default();
                    let props = record.properties_in_zone(zone_name);
                    (record.logical_id.clone(), TemplateResource::with_properties(record, props))
                }
                Declaration::Distribution(distribution) => {
                    let mut resource = TemplateResource::from_resource(distribution);
                    resource.depends_on = self.policies_needed_by(distribution);
                    (distribution.logical_id.clone(), resource)
                }
                other => match other.as_resource() {
                    Some(r) => (r.logical_id().to_string(), TemplateResource::from_resource(r)),
                    None => continue,
                },
            };
            template.resources.insert(id, resource);
        }
        for policy in bucket_policies.values() {
            template.resources.insert(policy.logical_id.clone(), TemplateResource::from_resource(policy));
        }

        for (name, output) in self.default_outputs() {
            template.outputs.insert(name, output);
        }
        for (name, output) in &self.outputs {
            if template.outputs.contains_key(name) {
                return Err(Error::DuplicateResource(format!("output {name}")));
            }
            template.outputs.insert(name.clone(), output.clone());
        }

        if let Some(missing) = template.unresolved_references().into_iter().next() {
            return Err(Error::UnresolvedReference { from: format!("template {}", self.name), to: missing });
        }
        tracing::info!(stack = %self.name, resources = template.resources.len(), outputs = template.outputs.len(), "synthesized template");
        Ok(template)
    }

    /// bucket policies that must exist before `distribution` serves anything.
    fn policies_needed_by(&self, distribution: &Distribution) -> Vec<String> {
        let origin = &distribution.default_behavior.origin;
        let mut out: Vec<String> = self
            .grants()
            .filter_map(|g| match g {
                Grant::Read { bucket, grantee } if bucket == &origin.bucket && grantee == &origin.origin_access_identity => {
                    Some(policy_logical_id(bucket))
                }
                _ => None,
            })
            .collect();
        out.dedup();
        out
    }

    fn default_outputs(&self) -> Vec<(String, ResourceOutput)> {
        let mut out = vec![];
        for bucket in self.buckets() {
            out.push((bucket_output_key(&bucket.logical_id), ResourceOutput {
                description: "name of the hosting bucket".into(),
                value: get_ref(&bucket.logical_id),
            }));
        }
        for distribution in self.distributions() {
            out.push((distribution_domain_output_key(&distribution.logical_id), ResourceOutput {
                description: "domain name assigned by cloudfront".into(),
                value: get_att(&distribution.logical_id, "DomainName"),
            }));
            out.push((distribution_id_output_key(&distribution.logical_id), ResourceOutput {
                description: "cloudfront distribution id".into(),
                value: get_ref(&distribution.logical_id),
            }));
        }
        out
    }
}

pub fn bucket_output_key(bucket_logical_id: &str) -> String {
    format!("{bucket_logical_id}Name")
}

pub fn distribution_domain_output_key(distribution_logical_id: &str) -> String {
    format!("{distribution_logical_id}DomainName")
}

pub fn distribution_id_output_key(distribution_logical_id: &str) -> String {
    format!("{distribution_logical_id}Id")
}
