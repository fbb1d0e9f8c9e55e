use serde_json::{json, Map, Value};

use super::*;

/// credential that lets a distribution read a private bucket.
#[derive(Debug, Clone)]
pub struct OriginAccessIdentity {
    pub logical_id: String,
    pub comment: String,
}

impl OriginAccessIdentity {
    pub fn new(construct_id: &str, comment: &str) -> Result<Self> {
        if comment.len() > 128 {
            return Err(Error::invalid_attribute("comment", "origin access identity comments are limited to 128 characters"));
        }
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            comment: comment.to_string(),
        })
    }
}

impl CfnResource for OriginAccessIdentity {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }
    fn properties(&self) -> Value {
        json!({
            "CloudFrontOriginAccessIdentityConfig": { "Comment": self.comment }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewerProtocolPolicy {
    #[default]
    AllowAll,
    HttpsOnly,
    RedirectToHttps,
}

impl ViewerProtocolPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::AllowAll => "allow-all",
            ViewerProtocolPolicy::HttpsOnly => "https-only",
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "allow-all" => Ok(ViewerProtocolPolicy::AllowAll),
            "https-only" => Ok(ViewerProtocolPolicy::HttpsOnly),
            "redirect-to-https" => Ok(ViewerProtocolPolicy::RedirectToHttps),
            _ => Err(Error::invalid_attribute(
                "viewer_protocol_policy",
                format!("unknown policy {:?}. Expected allow-all, https-only or redirect-to-https", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowedMethods {
    #[default]
    GetHead,
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
            AllowedMethods::All => &["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"],
        }
    }

    /// cloudfront only caches responses to these.
    pub fn cached_methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions | AllowedMethods::All => &["GET", "HEAD", "OPTIONS"],
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "get_head" | "GET_HEAD" => Ok(AllowedMethods::GetHead),
            "get_head_options" | "GET_HEAD_OPTIONS" => Ok(AllowedMethods::GetHeadOptions),
            "all" | "ALL" => Ok(AllowedMethods::All),
            _ => Err(Error::invalid_attribute(
                "allowed_methods",
                format!("unknown value {:?}. Expected get_head, get_head_options or all", s),
            )),
        }
    }
}

/// an S3 bucket origin read through an origin access identity.
#[derive(Debug, Clone, PartialEq)]
pub struct S3Origin {
    pub bucket: BucketRef,
    pub origin_access_identity: IdentityRef,
}

impl S3Origin {
    pub fn origin_id(&self) -> String {
        format!("{}origin", self.bucket.logical_id())
    }

    pub fn to_value(&self) -> Value {
        json!({
            "Id": self.origin_id(),
            "DomainName": get_att(self.bucket.logical_id(), "RegionalDomainName"),
            "S3OriginConfig": {
                "OriginAccessIdentity": join("", vec![
                    json!("origin-access-identity/cloudfront/"),
                    get_ref(self.origin_access_identity.logical_id()),
                ]),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Behavior {
    pub origin: S3Origin,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub allowed_methods: AllowedMethods,
    pub cache_policy_id: String,
    pub compress: bool,
}

impl Behavior {
    pub fn new(origin: S3Origin) -> Self {
        Self {
            origin,
            viewer_protocol_policy: ViewerProtocolPolicy::default(),
            allowed_methods: AllowedMethods::default(),
            cache_policy_id: CACHING_OPTIMIZED_POLICY_ID.to_string(),
            compress: true,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "TargetOriginId": self.origin.origin_id(),
            "ViewerProtocolPolicy": self.viewer_protocol_policy.as_str(),
            "AllowedMethods": self.allowed_methods.methods(),
            "CachedMethods": self.allowed_methods.cached_methods(),
            "CachePolicyId": self.cache_policy_id,
            "Compress": self.compress,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Distribution {
    pub logical_id: String,
    pub default_behavior: Behavior,
    pub certificate: Option<CertificateRef>,
    pub domain_names: Vec<String>,
    pub default_root_object: Option<String>,
    pub comment: Option<String>,
    /// optionally create the distribution disabled.
    pub enabled: bool,
}

impl Distribution {
    pub fn new(construct_id: &str, default_behavior: Behavior) -> Result<Self> {
        Ok(Self {
            logical_id: logical_id(construct_id)?,
            default_behavior,
            certificate: None,
            domain_names: vec![],
            default_root_object: None,
            comment: None,
            enabled: true,
        })
    }

    /// bind a certificate and the domain names it covers.
    pub fn with_domain(mut self, certificate: CertificateRef, domain_names: Vec<String>) -> Result<Self> {
        if domain_names.is_empty() {
            return Err(Error::invalid_attribute("domain_names", "a distribution bound to a certificate needs at least one domain name"));
        }
        for name in &domain_names {
            verify_domain_name(name)?;
        }
        self.certificate = Some(certificate);
        self.domain_names = domain_names;
        Ok(self)
    }
}

impl CfnResource for Distribution {
    fn logical_id(&self) -> &str {
        &self.logical_id
    }
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> Value {
        let mut config = Map::new();
        config.insert("Enabled".to_string(), Value::Bool(self.enabled));
        config.insert("HttpVersion".to_string(), json!("http2"));
        config.insert("IPV6Enabled".to_string(), Value::Bool(true));
        config.insert("Origins".to_string(), json!([self.default_behavior.origin.to_value()]));
        config.insert("DefaultCacheBehavior".to_string(), self.default_behavior.to_value());
        if let Some(root) = &self.default_root_object {
            config.insert("DefaultRootObject".to_string(), Value::String(root.clone()));
        }
        if let Some(comment) = &self.comment {
            config.insert("Comment".to_string(), Value::String(comment.clone()));
        }
        if !self.domain_names.is_empty() {
            config.insert("Aliases".to_string(), json!(self.domain_names));
        }
        if let Some(cert) = &self.certificate {
            config.insert("ViewerCertificate".to_string(), json!({
                "AcmCertificateArn": get_ref(cert.logical_id()),
                "MinimumProtocolVersion": "TLSv1.2_2021",
                "SslSupportMethod": "sni-only",
            }));
        }
        json!({ "DistributionConfig": Value::Object(config) })
    }
    fn references(&self) -> Vec<Reference> {
        let mut out = vec![
            self.default_behavior.origin.bucket.reference(),
            self.default_behavior.origin.origin_access_identity.reference(),
        ];
        if let Some(cert) = &self.certificate {
            out.push(cert.reference());
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn origin() -> S3Origin {
        S3Origin {
            bucket: BucketRef::from_logical_id("s3bucket"),
            origin_access_identity: IdentityRef::from_logical_id("oai"),
        }
    }

    #[test]
    fn identity_comment() {
        let oai = OriginAccessIdentity::new("test-origin-access-identity", "test origin access identity").unwrap();
        assert_eq!(oai.logical_id, "testoriginaccessidentity");
        assert_eq!(
            oai.properties()["CloudFrontOriginAccessIdentityConfig"]["Comment"],
            json!("test origin access identity")
        );
        assert!(OriginAccessIdentity::new("x", &"c".repeat(129)).is_err());
    }

    #[test]
    fn https_distribution_with_certificate() {
        let mut behavior = Behavior::new(origin());
        behavior.viewer_protocol_policy = ViewerProtocolPolicy::RedirectToHttps;
        let mut distro = Distribution::new("distro", behavior)
            .unwrap()
            .with_domain(CertificateRef::from_logical_id("certificate"), vec!["dev2.example.com".into()])
            .unwrap();
        distro.default_root_object = Some("index.html".into());
        let props = distro.properties();
        let config = &props["DistributionConfig"];
        assert_eq!(config["Aliases"], json!(["dev2.example.com"]));
        assert_eq!(config["DefaultRootObject"], json!("index.html"));
        assert_eq!(config["ViewerCertificate"]["AcmCertificateArn"], get_ref("certificate"));
        assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], json!("redirect-to-https"));
        assert_eq!(config["DefaultCacheBehavior"]["AllowedMethods"], json!(["GET", "HEAD"]));
        assert_eq!(config["DefaultCacheBehavior"]["TargetOriginId"], config["Origins"][0]["Id"]);
        assert_eq!(
            config["Origins"][0]["S3OriginConfig"]["OriginAccessIdentity"]["Fn::Join"][1][1],
            get_ref("oai")
        );
        assert_eq!(distro.references().len(), 3);
    }

    #[test]
    fn certificate_needs_domain_names() {
        let distro = Distribution::new("d", Behavior::new(origin())).unwrap();
        assert!(distro.with_domain(CertificateRef::from_logical_id("c"), vec![]).is_err());
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(ViewerProtocolPolicy::parse("https-only").unwrap(), ViewerProtocolPolicy::HttpsOnly);
        assert!(ViewerProtocolPolicy::parse("http").is_err());
        assert_eq!(AllowedMethods::parse("all").unwrap().methods().len(), 7);
        assert_eq!(AllowedMethods::All.cached_methods(), &["GET", "HEAD", "OPTIONS"]);
    }
}
