//! Permission grants from managed resources to an origin access identity.
//!
//! Grants are declarations of their own: they sit in the stack's dependency
//! graph between the resources they connect and whatever serves through the
//! identity. At synth time a read grant becomes a bucket policy and a decrypt
//! grant becomes a statement in the key's policy.

use serde_json::{json, Map, Value};

use crate::resources::*;

pub const READ_ACTIONS: &[&str] = &["s3:GetObject*", "s3:GetBucket*", "s3:List*"];
pub const DECRYPT_ACTIONS: &[&str] = &["kms:Decrypt"];

#[derive(Debug, Clone, PartialEq)]
pub enum Grant {
    Read { bucket: BucketRef, grantee: IdentityRef },
    Decrypt { key: KeyRef, grantee: IdentityRef },
}

impl Grant {
    /// graph node name. grants have no logical id of their own.
    pub fn node_id(&self) -> String {
        match self {
            Grant::Read { bucket, grantee } => format!("grant-read({} -> {})", bucket.logical_id(), grantee.logical_id()),
            Grant::Decrypt { key, grantee } => format!("grant-decrypt({} -> {})", key.logical_id(), grantee.logical_id()),
        }
    }

    pub fn target(&self) -> Reference {
        match self {
            Grant::Read { bucket, .. } => bucket.reference(),
            Grant::Decrypt { key, .. } => key.reference(),
        }
    }

    pub fn grantee(&self) -> &IdentityRef {
        match self {
            Grant::Read { grantee, .. } | Grant::Decrypt { grantee, .. } => grantee,
        }
    }

    pub fn references(&self) -> Vec<Reference> {
        vec![self.target(), self.grantee().reference()]
    }

    pub fn statement(&self) -> PolicyStatement {
        let principal = canonical_user_principal(self.grantee().logical_id());
        match self {
            Grant::Read { bucket, .. } => {
                let arn = get_att(bucket.logical_id(), "Arn");
                let objects = join("", vec![arn.clone(), json!("/*")]);
                PolicyStatement::allow(principal, READ_ACTIONS, vec![arn, objects])
            }
            Grant::Decrypt { .. } => PolicyStatement::allow(principal, DECRYPT_ACTIONS, vec![json!("*")]),
        }
    }
}

/// the `AWS::S3::BucketPolicy` that carries every read grant on one bucket.
#[derive(Debug, Clone)]
pub struct BucketPolicy {
    pub logical_id: String,
    pub bucket: BucketRef,
    pub statements: Vec<PolicyStatement>,
}

impl BucketPolicy {
    pub fn for_bucket(bucket: &BucketRef) -> Self {
        Self {
            logical_id: policy_logical_id(bucket),
            bucket: bucket.clone(),
            statements: vec![],
        }
    }
}

pub fn policy_logical_id(bucket: &BucketRef) -> String {
    format!("{}Policy", bucket.logical_id())
}

impl CfnResource for BucketPolicy {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("Bucket".to_string(), get_ref(self.bucket.logical_id()));
        map.insert("PolicyDocument".to_string(), create_policy_doc(&self.statements));
        Value::Object(map)
    }
    fn references(&self) -> Vec<Reference> {
        vec![self.bucket.reference()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn read() -> Grant {
        Grant::Read {
            bucket: BucketRef::from_logical_id("s3bucket"),
            grantee: IdentityRef::from_logical_id("oai"),
        }
    }

    #[test]
    fn read_grant_covers_bucket_and_objects() {
        let statement = read().statement().to_value();
        assert_eq!(statement["Action"], json!(READ_ACTIONS));
        assert_eq!(statement["Resource"][0], get_att("s3bucket", "Arn"));
        assert_eq!(statement["Resource"][1]["Fn::Join"][1][1], json!("/*"));
        assert_eq!(statement["Principal"]["CanonicalUser"], get_att("oai", "S3CanonicalUserId"));
    }

    #[test]
    fn decrypt_grant_is_a_single_action() {
        let grant = Grant::Decrypt {
            key: KeyRef::from_logical_id("bucketkey"),
            grantee: IdentityRef::from_logical_id("oai"),
        };
        assert_eq!(grant.statement().to_value()["Action"], json!("kms:Decrypt"));
        assert_eq!(grant.node_id(), "grant-decrypt(bucketkey -> oai)");
        assert_eq!(grant.references().len(), 2);
    }

    #[test]
    fn bucket_policy_rendering() {
        let mut policy = BucketPolicy::for_bucket(&BucketRef::from_logical_id("s3bucket"));
        policy.statements.push(read().statement());
        assert_eq!(policy.logical_id, "s3bucketPolicy");
        let props = policy.properties();
        assert_eq!(props["Bucket"], get_ref("s3bucket"));
        assert_eq!(props["PolicyDocument"]["Statement"].as_array().unwrap().len(), 1);
    }
}
