use serde_json::{json, Map, Value};

use super::*;

#[derive(Debug, Clone, PartialEq)]
pub enum CertificateValidation {
    /// validation records are written into a hosted zone of this stack.
    Dns(ZoneRef),
    Email,
}

/// An ACM certificate. With DNS validation the domain must live in a
/// Route 53 hosted zone of the same account.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub logical_id: String,
    /// the domain you're requesting a certificate for. Must be fully qualified. Can have 1 optional wildcard.
    /// Examples of valid values:
    /// - www.mysite.com
    /// - mysite.com
    /// - *.mysite.com
    /// Examples of invalid values:
    /// - *.something.*.mysite.com
    /// - cannotendwithdot.com.
    pub domain_name: String,
    pub validation: CertificateValidation,
}

impl Certificate {
    pub fn new(construct_id: &str, domain_name: &str, validation: CertificateValidation) -> Result<Self> {
        verify_certificate_domain(domain_name)?;
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            domain_name: domain_name.to_string(),
            validation,
        })
    }
}

pub fn verify_certificate_domain(domain_name: &str) -> Result<()> {
    if domain_name.is_empty() {
        return Err(Error::invalid_name(domain_name, "Must provide a domain name"));
    }
    if domain_name.matches('*').count() > 1 {
        return Err(Error::invalid_name(domain_name, "Must only provide 1 wildcard"));
    }
    if domain_name.contains('*') && !domain_name.starts_with("*.") {
        return Err(Error::invalid_name(domain_name, "If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\""));
    }
    verify_domain_name(domain_name)
}

impl CfnResource for Certificate {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }
    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("DomainName".to_string(), Value::String(self.domain_name.clone()));
        match &self.validation {
            CertificateValidation::Dns(zone) => {
                map.insert("ValidationMethod".to_string(), json!("DNS"));
                map.insert("DomainValidationOptions".to_string(), json!([{
                    "DomainName": self.domain_name,
                    "HostedZoneId": get_ref(zone.logical_id()),
                }]));
            }
            CertificateValidation::Email => {
                map.insert("ValidationMethod".to_string(), json!("EMAIL"));
            }
        }
        Value::Object(map)
    }
    fn references(&self) -> Vec<Reference> {
        match &self.validation {
            CertificateValidation::Dns(zone) => vec![zone.reference()],
            CertificateValidation::Email => vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dns_validated_certificate() {
        let cert = Certificate::new(
            "certificate",
            "dev2.example.com",
            CertificateValidation::Dns(ZoneRef::from_logical_id("testhostedzone")),
        )
        .unwrap();
        let props = cert.properties();
        assert_eq!(props["ValidationMethod"], json!("DNS"));
        assert_eq!(props["DomainValidationOptions"][0]["HostedZoneId"], get_ref("testhostedzone"));
        assert_eq!(props["DomainValidationOptions"][0]["DomainName"], json!("dev2.example.com"));
        assert_eq!(cert.references().len(), 1);
    }

    #[test]
    fn wildcard_rules() {
        assert!(verify_certificate_domain("*.example.com").is_ok());
        assert!(verify_certificate_domain("*.*.example.com").is_err());
        assert!(verify_certificate_domain("www.*.example.com").is_err());
        assert!(verify_certificate_domain("").is_err());
        assert!(verify_certificate_domain("cannotendwithdot.com.").is_err());
    }

    #[test]
    fn email_validation_has_no_references() {
        let cert = Certificate::new("c", "example.com", CertificateValidation::Email).unwrap();
        assert!(cert.references().is_empty());
        assert_eq!(cert.properties()["ValidationMethod"], json!("EMAIL"));
    }
}
