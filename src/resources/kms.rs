use serde_json::{json, Map, Value};

use super::*;

/// customer managed KMS key. the key policy always lets the account root
/// administer the key; grants append more statements at synth time.
#[derive(Debug, Clone)]
pub struct Key {
    pub logical_id: String,
    pub description: Option<String>,
    pub enable_key_rotation: bool,
    pub extra_statements: Vec<PolicyStatement>,
}

impl Key {
    pub fn new(construct_id: &str) -> Result<Self> {
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            description: None,
            enable_key_rotation: false,
            extra_statements: vec![],
        })
    }

    pub fn key_policy(&self) -> Value {
        let mut statements = vec![PolicyStatement::allow(
            json!({ "AWS": account_root_arn() }),
            &["kms:*"],
            vec![json!("*")],
        )];
        statements.extend(self.extra_statements.iter().cloned());
        create_policy_doc(&statements)
    }
}

impl CfnResource for Key {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::KMS::Key"
    }
    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("KeyPolicy".to_string(), self.key_policy());
        if let Some(description) = &self.description {
            map.insert("Description".to_string(), Value::String(description.clone()));
        }
        if self.enable_key_rotation {
            map.insert("EnableKeyRotation".to_string(), Value::Bool(true));
        }
        Value::Object(map)
    }
    fn deletion_policy(&self) -> Option<&'static str> {
        Some("Retain")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_policy_grants_root() {
        let key = Key::new("bucket-key").unwrap();
        assert_eq!(key.logical_id, "bucketkey");
        let props = key.properties();
        let statements = props["KeyPolicy"]["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["Action"], json!("kms:*"));
        assert!(props.get("EnableKeyRotation").is_none());
        assert_eq!(key.deletion_policy(), Some("Retain"));
    }

    #[test]
    fn extra_statements_are_appended() {
        let mut key = Key::new("k").unwrap();
        key.extra_statements.push(PolicyStatement::allow(
            canonical_user_principal("oai"),
            &["kms:Decrypt"],
            vec![json!("*")],
        ));
        let props = key.properties();
        let statements = props["KeyPolicy"]["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1]["Principal"]["CanonicalUser"], get_att("oai", "S3CanonicalUserId"));
    }
}
