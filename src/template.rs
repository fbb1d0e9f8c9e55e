use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::resources::CfnResource;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl TemplateResource {
    pub fn from_resource(resource: &dyn CfnResource) -> Self {
        Self::with_properties(resource, resource.properties())
    }

    /// like `from_resource` but with properties the caller already rendered.
    pub fn with_properties(resource: &dyn CfnResource, properties: Value) -> Self {
        let retain = resource.deletion_policy().map(str::to_string);
        Self {
            ty: resource.type_string().to_string(),
            properties,
            depends_on: vec![],
            update_replace_policy: retain.clone(),
            deletion_policy: retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl Template {
    pub fn resource(&self, logical_id: &str) -> Option<&TemplateResource> {
        self.resources.get(logical_id)
    }

    /// we make it pretty so if a user needs to look at the stack in the Cfn console, it looks nice
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// every `Ref`, `Fn::GetAtt` and `DependsOn` target that is neither a
    /// resource of this template nor an `AWS::` pseudo parameter.
    pub fn unresolved_references(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        for resource in self.resources.values() {
            collect_references(&resource.properties, &mut found);
            found.extend(resource.depends_on.iter().cloned());
        }
        for output in self.outputs.values() {
            collect_references(&output.value, &mut found);
        }
        found
            .into_iter()
            .filter(|r| !r.starts_with("AWS::") && !self.resources.contains_key(r))
            .collect()
    }
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                out.insert(target.clone());
            }
            if let Some(Value::Array(att)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = att.first() {
                    out.insert(target.clone());
                }
            }
            if let Some(Value::String(template)) = map.get("Fn::Sub") {
                out.extend(sub_variables(template));
            }
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(list) => {
            for v in list {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

/// `${Name}` and `${Name.Attribute}` placeholders. `${!Literal}` is skipped.
fn sub_variables(template: &str) -> Vec<String> {
    let mut out = vec![];
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let name = &after[..end];
        if !name.starts_with('!') {
            let resource = name.split('.').next().unwrap_or(name);
            out.push(resource.to_string());
        }
        rest = &after[end + 1..];
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_cloudformation_keys() {
        let mut template = Template::default();
        template.resources.insert("Zone".into(), TemplateResource {
            ty: "AWS::Route53::HostedZone".into(),
            properties: json!({ "Name": "example.com." }),
            ..Default::default()
        });
        let s = template.to_json_pretty().unwrap();
        assert!(s.contains("\"AWSTemplateFormatVersion\": \"2010-09-09\""));
        assert!(s.contains("\"Type\": \"AWS::Route53::HostedZone\""));
        assert!(!s.contains("DependsOn"));
        assert!(!s.contains("Outputs"));
        assert_eq!(Template::from_json(&s).unwrap(), template);
    }

    #[test]
    fn finds_dangling_references() {
        let mut template = Template::default();
        template.resources.insert("A".into(), TemplateResource {
            ty: "AWS::S3::Bucket".into(),
            properties: json!({
                "X": { "Ref": "B" },
                "Y": [{ "Fn::GetAtt": ["A", "Arn"] }, { "Ref": "AWS::AccountId" }],
            }),
            depends_on: vec!["C".into()],
            ..Default::default()
        });
        let missing: Vec<String> = template.unresolved_references().into_iter().collect();
        assert_eq!(missing, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn sub_placeholders_count_as_references() {
        let mut template = Template::default();
        template.resources.insert("Key".into(), TemplateResource {
            ty: "AWS::KMS::Key".into(),
            properties: json!({ "Arn": { "Fn::Sub": "arn:${AWS::Partition}:s3:::${Site.Arn}/${!Literal}" } }),
            ..Default::default()
        });
        let missing: Vec<String> = template.unresolved_references().into_iter().collect();
        assert_eq!(missing, vec!["Site".to_string()]);
    }
}
