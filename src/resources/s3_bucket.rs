use serde_json::{json, Map, Value};

use super::*;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum BucketEncryption {
    Unencrypted,
    /// SSE-S3
    #[default]
    S3Managed,
    /// SSE-KMS with a key declared in the same stack.
    Kms(KeyRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebsiteConfiguration {
    pub index_document: String,
    pub error_document: Option<String>,
}

impl Default for WebsiteConfiguration {
    fn default() -> Self {
        Self {
            index_document: "index.html".into(),
            error_document: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bucket {
    pub logical_id: String,
    /// if left empty, cloudformation generates a name from the logical id.
    pub bucket_name: Option<String>,
    pub encryption: BucketEncryption,
    pub website: Option<WebsiteConfiguration>,
    pub block_public_access: bool,
}

impl Bucket {
    pub fn new(construct_id: &str) -> Result<Self> {
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            bucket_name: None,
            encryption: BucketEncryption::default(),
            website: None,
            block_public_access: true,
        })
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        verify_bucket_name(name)?;
        self.bucket_name = Some(name.to_string());
        Ok(self)
    }
}

/// https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html
pub fn verify_bucket_name(name: &str) -> Result<()> {
    let rule = "Bucket names must be between 3 and 63 characters, consist only of lowercase letters, numbers, dots and hyphens, and begin and end with a letter or number";
    if name.len() < 3 || name.len() > 63 {
        return Err(Error::invalid_name(name, rule));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return Err(Error::invalid_name(name, rule));
    }
    let edge_ok = |c: Option<char>| c.map(|c| c.is_ascii_lowercase() || c.is_ascii_digit()).unwrap_or(false);
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(Error::invalid_name(name, rule));
    }
    if name.contains("..") {
        return Err(Error::invalid_name(name, "Bucket names must not contain two adjacent periods"));
    }
    Ok(())
}

impl CfnResource for Bucket {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> Value {
        let mut map = Map::new();
        if let Some(name) = &self.bucket_name {
            map.insert("BucketName".to_string(), Value::String(name.clone()));
        }
        let default_encryption = match &self.encryption {
            BucketEncryption::Unencrypted => None,
            BucketEncryption::S3Managed => Some(json!({ "SSEAlgorithm": "AES256" })),
            BucketEncryption::Kms(key) => Some(json!({
                "SSEAlgorithm": "aws:kms",
                "KMSMasterKeyID": get_att(key.logical_id(), "Arn"),
            })),
        };
        if let Some(by_default) = default_encryption {
            map.insert("BucketEncryption".to_string(), json!({
                "ServerSideEncryptionConfiguration": [{ "ServerSideEncryptionByDefault": by_default }]
            }));
        }
        if let Some(website) = &self.website {
            let mut conf = Map::new();
            conf.insert("IndexDocument".to_string(), Value::String(website.index_document.clone()));
            if let Some(error) = &website.error_document {
                conf.insert("ErrorDocument".to_string(), Value::String(error.clone()));
            }
            map.insert("WebsiteConfiguration".to_string(), Value::Object(conf));
        }
        if self.block_public_access {
            map.insert("PublicAccessBlockConfiguration".to_string(), json!({
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            }));
        }
        Value::Object(map)
    }
    fn references(&self) -> Vec<Reference> {
        match &self.encryption {
            BucketEncryption::Kms(key) => vec![key.reference()],
            _ => vec![],
        }
    }
    fn deletion_policy(&self) -> Option<&'static str> {
        Some("Retain")
    }
}
