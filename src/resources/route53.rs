use serde_json::{json, Map, Value};

use super::*;

#[derive(Debug, Clone)]
pub struct HostedZone {
    pub logical_id: String,
    /// without the trailing dot, eg: `dev2.example.com`
    pub zone_name: String,
    pub comment: Option<String>,
}

impl HostedZone {
    pub fn new(construct_id: &str, zone_name: &str) -> Result<Self> {
        let zone_name = zone_name.trim_end_matches('.');
        verify_domain_name(zone_name)?;
        if zone_name.starts_with('*') {
            return Err(Error::invalid_name(zone_name, "Hosted zone names cannot contain a wildcard"));
        }
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            zone_name: zone_name.to_string(),
            comment: None,
        })
    }
}

impl CfnResource for HostedZone {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::Route53::HostedZone"
    }
    fn properties(&self) -> Value {
        let mut map = Map::new();
        // hosted zone name must end in .
        map.insert("Name".to_string(), Value::String(format!("{}.", self.zone_name)));
        if let Some(comment) = &self.comment {
            map.insert("HostedZoneConfig".to_string(), json!({ "Comment": comment }));
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            _ => Err(Error::invalid_attribute("record_type", format!("unsupported record type {:?}. Expected A, AAAA or CNAME", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordTarget {
    /// alias to a distribution in this stack.
    Distribution(DistributionRef),
    /// plain resource records.
    Values { values: Vec<String>, ttl: u32 },
}

#[derive(Debug, Clone)]
pub struct RecordSet {
    pub logical_id: String,
    pub zone: ZoneRef,
    /// defaults to the zone's own name when not set.
    pub record_name: Option<String>,
    pub record_type: RecordType,
    pub target: RecordTarget,
}

impl RecordSet {
    pub fn new(construct_id: &str, zone: ZoneRef, record_type: RecordType, target: RecordTarget) -> Result<Self> {
        if let RecordTarget::Values { values, .. } = &target {
            if values.is_empty() {
                return Err(Error::invalid_attribute("target", "record set needs at least one value"));
            }
        }
        if record_type == RecordType::Cname && matches!(target, RecordTarget::Distribution(_)) {
            return Err(Error::invalid_attribute("record_type", "alias records must be A or AAAA"));
        }
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            zone,
            record_name: None,
            record_type,
            target,
        })
    }

    /// the name this record set will answer for, given its zone's name.
    pub fn resolved_name(&self, zone_name: &str) -> String {
        match &self.record_name {
            Some(name) => name.trim_end_matches('.').to_string(),
            None => zone_name.trim_end_matches('.').to_string(),
        }
    }

    /// render for a zone whose name is `zone_name`.
    pub fn properties_in_zone(&self, zone_name: &str) -> Value {
        let mut map = Map::new();
        map.insert("HostedZoneId".to_string(), get_ref(self.zone.logical_id()));
        map.insert("Name".to_string(), Value::String(format!("{}.", self.resolved_name(zone_name))));
        map.insert("Type".to_string(), Value::String(self.record_type.as_str().to_string()));
        match &self.target {
            RecordTarget::Distribution(distribution) => {
                map.insert("AliasTarget".to_string(), json!({
                    "DNSName": get_att(distribution.logical_id(), "DomainName"),
                    "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
                }));
            }
            RecordTarget::Values { values, ttl } => {
                map.insert("ResourceRecords".to_string(), json!(values));
                map.insert("TTL".to_string(), Value::String(ttl.to_string()));
            }
        }
        Value::Object(map)
    }
}

impl CfnResource for RecordSet {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }
    /// stacks render through `properties_in_zone`. without the zone this falls
    /// back to the explicit record name.
    fn properties(&self) -> Value {
        let name = self.record_name.clone().unwrap_or_default();
        self.properties_in_zone(&name)
    }
    fn references(&self) -> Vec<Reference> {
        let mut out = vec![self.zone.reference()];
        if let RecordTarget::Distribution(distribution) = &self.target {
            out.push(distribution.reference());
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zone_name_gets_trailing_dot() {
        let zone = HostedZone::new("test-hosted-zone", "dev2.example.com").unwrap();
        assert_eq!(zone.logical_id, "testhostedzone");
        assert_eq!(zone.properties()["Name"], json!("dev2.example.com."));
        assert!(HostedZone::new("z", "*.example.com").is_err());
    }

    #[test]
    fn alias_record_defaults_to_zone_name() {
        let record = RecordSet::new(
            "recordset",
            ZoneRef::from_logical_id("zone"),
            RecordType::A,
            RecordTarget::Distribution(DistributionRef::from_logical_id("distro")),
        )
        .unwrap();
        let props = record.properties_in_zone("dev2.example.com");
        assert_eq!(props["Name"], json!("dev2.example.com."));
        assert_eq!(props["Type"], json!("A"));
        assert_eq!(props["HostedZoneId"], get_ref("zone"));
        assert_eq!(props["AliasTarget"]["HostedZoneId"], json!(CLOUDFRONT_HOSTED_ZONE_ID));
        assert_eq!(props["AliasTarget"]["DNSName"], get_att("distro", "DomainName"));
        assert_eq!(record.references().len(), 2);
    }

    #[test]
    fn cname_alias_is_rejected() {
        let res = RecordSet::new(
            "r",
            ZoneRef::from_logical_id("zone"),
            RecordType::Cname,
            RecordTarget::Distribution(DistributionRef::from_logical_id("d")),
        );
        assert!(res.is_err());
        assert_eq!(RecordType::parse("aaaa").unwrap(), RecordType::Aaaa);
        assert!(RecordType::parse("MX").is_err());
    }

    #[test]
    fn value_records_carry_ttl() {
        let mut record = RecordSet::new(
            "txt",
            ZoneRef::from_logical_id("zone"),
            RecordType::A,
            RecordTarget::Values { values: vec!["192.0.2.1".into()], ttl: 300 },
        )
        .unwrap();
        record.record_name = Some("www.example.com".into());
        let props = record.properties_in_zone("example.com");
        assert_eq!(props["Name"], json!("www.example.com."));
        assert_eq!(props["TTL"], json!("300"));
        assert_eq!(record.references().len(), 1);
    }
}
