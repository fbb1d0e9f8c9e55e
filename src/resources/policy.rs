use serde_json::{json, Map, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    /// already rendered principal block, eg: `{"CanonicalUser": ...}`
    pub principal: Value,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow(principal: Value, actions: &[&str], resources: Vec<Value>) -> Self {
        Self {
            effect: Effect::Allow,
            principal,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("Effect".to_string(), Value::String(self.effect.as_str().to_string()));
        map.insert("Principal".to_string(), self.principal.clone());
        map.insert("Action".to_string(), one_or_many(self.actions.iter().map(|a| Value::String(a.clone())).collect()));
        map.insert("Resource".to_string(), one_or_many(self.resources.clone()));
        Value::Object(map)
    }
}

/// single entries render as a scalar, like the console does.
fn one_or_many(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

pub fn create_policy_doc(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements.iter().map(PolicyStatement::to_value).collect::<Vec<_>>(),
    })
}

/// principal block for an origin access identity.
pub fn canonical_user_principal(identity_logical_id: &str) -> Value {
    json!({ "CanonicalUser": super::get_att(identity_logical_id, "S3CanonicalUserId") })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_action_is_a_scalar() {
        let s = PolicyStatement::allow(json!({"AWS": "*"}), &["kms:Decrypt"], vec![json!("*")]);
        let v = s.to_value();
        assert_eq!(v["Action"], json!("kms:Decrypt"));
        assert_eq!(v["Resource"], json!("*"));
        assert_eq!(v["Effect"], json!("Allow"));
    }

    #[test]
    fn doc_has_version() {
        let doc = create_policy_doc(&[]);
        assert_eq!(doc["Version"], json!("2012-10-17"));
        assert_eq!(doc["Statement"], json!([]));
    }
}
