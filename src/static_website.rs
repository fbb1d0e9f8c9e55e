//! The hosted frontend: a KMS encrypted bucket served by CloudFront over
//! HTTPS on a domain whose zone, certificate and alias record live in the
//! same stack.

use crate::error::{Error, Result};
use crate::parsing::AttributeValue;
use crate::resources::*;
use crate::stack::{Stack, DEFAULT_REGION};
use crate::variables::Variables;

pub const DEFAULT_ENVIRONMENT: &str = "test";
pub const DEFAULT_DOMAIN_NAME: &str = "dev2.example.com";
pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";

#[derive(Debug, Clone, PartialEq)]
pub struct StaticWebsite {
    /// prefixes the bucket name and the identity, eg: `test-hosted-frontend`.
    pub deploy_environment: String,
    pub domain_name: String,
    pub index_document: String,
    /// defaults to `{deploy_environment}-static-website`
    pub stack_name: Option<String>,
    pub region: String,
}

impl Default for StaticWebsite {
    fn default() -> Self {
        Self {
            deploy_environment: DEFAULT_ENVIRONMENT.into(),
            domain_name: DEFAULT_DOMAIN_NAME.into(),
            index_document: DEFAULT_INDEX_DOCUMENT.into(),
            stack_name: None,
            region: DEFAULT_REGION.into(),
        }
    }
}

impl StaticWebsite {
    /// defaults overridden by `DEPLOY_ENVIRONMENT`, `DOMAIN_NAME`,
    /// `INDEX_DOCUMENT`, `STACK_NAME` and `DEPLOY_REGION`.
    pub fn from_variables(vars: &Variables) -> Self {
        let mut out = Self::default();
        if let Some(v) = vars.get("DEPLOY_ENVIRONMENT") {
            out.deploy_environment = v.to_string();
        }
        if let Some(v) = vars.get("DOMAIN_NAME") {
            out.domain_name = v.to_string();
        }
        if let Some(v) = vars.get("INDEX_DOCUMENT") {
            out.index_document = v.to_string();
        }
        if let Some(v) = vars.get("STACK_NAME") {
            out.stack_name = Some(v.to_string());
        }
        if let Some(v) = vars.get("DEPLOY_REGION") {
            out.region = v.to_string();
        }
        out
    }

    /// override fields from an attribute map such as
    /// `{ domain_name: "dev2.example.com", deploy_environment: "prod" }`
    pub fn apply_attributes(&mut self, value: AttributeValue) -> Result<()> {
        let map = value.assert_map("static website attributes")?;
        for (key, val) in map {
            match key.as_str() {
                "deploy_environment" => self.deploy_environment = val.assert_str("deploy_environment")?,
                "domain_name" | "url" => self.domain_name = val.assert_str("domain_name")?,
                "index_document" => self.index_document = val.assert_str("index_document")?,
                "stack_name" => self.stack_name = Some(val.assert_str("stack_name")?),
                "region" => self.region = val.assert_str("region")?,
                x => return Err(Error::invalid_attribute(x, "unexpected key in static website attributes")),
            }
        }
        if self.domain_name.is_empty() {
            return Err(Error::invalid_attribute("domain_name", "Must provide a domain name to static website attributes"));
        }
        Ok(())
    }

    pub fn stack_name(&self) -> String {
        match &self.stack_name {
            Some(name) => name.clone(),
            None => format!("{}-static-website", self.deploy_environment),
        }
    }

    pub fn bucket_name(&self) -> String {
        format!("{}-hosted-frontend", self.deploy_environment)
    }

    /// declare the whole topology. declaration order is also a valid creation order.
    pub fn build(&self) -> Result<Stack> {
        let env = &self.deploy_environment;
        let mut stack = Stack::new(&self.stack_name(), &self.region)?;
        stack.set_description(&format!("{env} static website for {}", self.domain_name));

        let bucket_key = stack.add_key(Key::new("bucket-key")?)?;

        let mut bucket = Bucket::new("s3-bucket")?.with_name(&self.bucket_name())?;
        bucket.encryption = BucketEncryption::Kms(bucket_key.clone());
        bucket.website = Some(WebsiteConfiguration {
            index_document: self.index_document.clone(),
            error_document: None,
        });
        let bucket = stack.add_bucket(bucket)?;

        let zone = stack.add_hosted_zone(HostedZone::new(&format!("{env}-hosted-zone"), &self.domain_name)?)?;

        let cert = stack.add_certificate(Certificate::new(
            "certificate",
            &self.domain_name,
            CertificateValidation::Dns(zone.clone()),
        )?)?;

        let identity = stack.add_origin_access_identity(OriginAccessIdentity::new(
            &format!("{env}-origin-access-identity"),
            &format!("{env} origin access identity"),
        )?)?;

        stack.grant_read(&bucket, &identity)?;
        stack.grant_decrypt(&bucket_key, &identity)?;

        let mut behavior = Behavior::new(S3Origin { bucket, origin_access_identity: identity });
        behavior.viewer_protocol_policy = ViewerProtocolPolicy::RedirectToHttps;
        behavior.allowed_methods = AllowedMethods::GetHead;
        let mut distribution = Distribution::new("distro", behavior)?.with_domain(cert, vec![self.domain_name.clone()])?;
        distribution.default_root_object = Some(self.index_document.clone());
        let distribution = stack.add_distribution(distribution)?;

        stack.add_record_set(RecordSet::new(
            "recordset",
            zone,
            RecordType::A,
            RecordTarget::Distribution(distribution),
        )?)?;

        tracing::debug!(stack = %stack.name(), domain = %self.domain_name, "declared static website");
        Ok(stack)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parsing::parse_attribute_str;
    use crate::stack::Declaration;

    #[test]
    fn defaults_match_the_test_environment() {
        let site = StaticWebsite::default();
        assert_eq!(site.bucket_name(), "test-hosted-frontend");
        assert_eq!(site.stack_name(), "test-static-website");
        let stack = site.build().unwrap();
        let ids: Vec<String> = stack.declarations().iter().map(Declaration::node_id).collect();
        assert_eq!(ids, vec![
            "bucketkey",
            "s3bucket",
            "testhostedzone",
            "certificate",
            "testoriginaccessidentity",
            "grant-read(s3bucket -> testoriginaccessidentity)",
            "grant-decrypt(bucketkey -> testoriginaccessidentity)",
            "distro",
            "recordset",
        ]);
    }

    #[test]
    fn variables_then_attributes() {
        let mut vars = Variables::new();
        vars.set("DEPLOY_ENVIRONMENT", "prod");
        vars.set("DOMAIN_NAME", "www.example.com");
        let mut site = StaticWebsite::from_variables(&vars);
        assert_eq!(site.deploy_environment, "prod");
        let attrs = parse_attribute_str(r#"{ domain_name: "shop.example.com", stack_name: "shop" }"#, &vars).unwrap();
        site.apply_attributes(attrs).unwrap();
        assert_eq!(site.domain_name, "shop.example.com");
        assert_eq!(site.stack_name(), "shop");
        assert_eq!(site.bucket_name(), "prod-hosted-frontend");
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let mut site = StaticWebsite::default();
        let attrs = parse_attribute_str(r#"{ colour: "blue" }"#, &Variables::new()).unwrap();
        assert!(site.apply_attributes(attrs).is_err());
    }

    #[test]
    fn bad_environment_fails_bucket_rules() {
        let site = StaticWebsite { deploy_environment: "Prod".into(), stack_name: Some("prod".into()), ..Default::default() };
        assert!(matches!(site.build().unwrap_err(), Error::InvalidName { .. }));
    }
}
