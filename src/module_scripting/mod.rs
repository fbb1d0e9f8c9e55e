//! Stack declarations written as Rhai scripts.
//!
//! A script runs once, top to bottom. Each declaration function returns an
//! opaque handle that later declarations take as input:
//!
//! ```rhai
//! let key = kms_key("bucket-key");
//! let bucket = s3_bucket("s3-bucket", #{ bucket_name: "test-hosted-frontend", encryption_key: key });
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use base64::{engine::general_purpose, Engine as _};
use rhai::{Array, Engine, EvalAltResult, Map, Scope};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resources::*;
use crate::stack::Stack;
use crate::variables::Variables;

pub const MODULES_DIR: &str = "./sitestack/modules";
/// `owner/repo` that namespaced scripts are downloaded from.
pub const REGISTRY_VAR: &str = "SITESTACK_REGISTRY";

type RhaiResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// what scripts hold on to after declaring something.
#[derive(Debug, Clone)]
pub struct Handle {
    pub logical_id: String,
    pub kind: ResourceKind,
}

impl Handle {
    fn require(&self, kind: ResourceKind, arg: &str) -> RhaiResult<String> {
        if self.kind != kind {
            return Err(format!("'{arg}' must be a {kind} handle, found {} '{}'", self.kind, self.logical_id).into());
        }
        Ok(self.logical_id.clone())
    }
}

fn to_rhai(e: Error) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// option maps passed as the last argument to declarations.
struct Options<'a> {
    context: &'a str,
    map: Map,
}

impl<'a> Options<'a> {
    fn new(context: &'a str, map: Map, allowed: &[&str]) -> RhaiResult<Self> {
        for key in map.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(format!("Unexpected key '{key}' in {context} options. Expected one of {:?}", allowed).into());
            }
        }
        Ok(Self { context, map })
    }

    fn string(&self, key: &str) -> RhaiResult<Option<String>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(v) => v
                .clone()
                .into_string()
                .map(Some)
                .map_err(|t| format!("{}.{key} must be a string, found {t}", self.context).into()),
        }
    }

    fn bool(&self, key: &str) -> RhaiResult<Option<bool>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .map_err(|t| format!("{}.{key} must be a bool, found {t}", self.context).into()),
        }
    }

    fn int(&self, key: &str) -> RhaiResult<Option<u32>> {
        let Some(v) = self.map.get(key) else { return Ok(None) };
        let n = v
            .as_int()
            .map_err(|t| -> Box<EvalAltResult> { format!("{}.{key} must be an integer, found {t}", self.context).into() })?;
        u32::try_from(n)
            .map(Some)
            .map_err(|_| format!("{}.{key} out of range: {n}", self.context).into())
    }

    fn handle(&self, key: &str, kind: ResourceKind) -> RhaiResult<Option<String>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(v) => match v.clone().try_cast::<Handle>() {
                Some(h) => h.require(kind, &format!("{}.{key}", self.context)).map(Some),
                None => Err(format!("{}.{key} must be a {kind} handle, found {}", self.context, v.type_name()).into()),
            },
        }
    }

    fn required_handle(&self, key: &str, kind: ResourceKind) -> RhaiResult<String> {
        self.handle(key, kind)?.ok_or_else(|| format!("{} requires '{key}'", self.context).into())
    }

    fn strings(&self, key: &str) -> RhaiResult<Option<Vec<String>>> {
        let Some(v) = self.map.get(key) else { return Ok(None) };
        let list: Array = v
            .clone()
            .into_array()
            .map_err(|t| -> Box<EvalAltResult> { format!("{}.{key} must be an array, found {t}", self.context).into() })?;
        let mut out = vec![];
        for item in list {
            out.push(
                item.into_string()
                    .map_err(|t| -> Box<EvalAltResult> { format!("{}.{key} must only contain strings, found {t}", self.context).into() })?,
            );
        }
        Ok(Some(out))
    }

    fn map(&self, key: &str) -> RhaiResult<Option<Map>> {
        match self.map.get(key) {
            None => Ok(None),
            Some(v) => match v.clone().try_cast::<Map>() {
                Some(m) => Ok(Some(m)),
                None => Err(format!("{}.{key} must be an object map, found {}", self.context, v.type_name()).into()),
            },
        }
    }
}

fn handle(logical_id: &str, kind: ResourceKind) -> Handle {
    Handle { logical_id: logical_id.to_string(), kind }
}

fn bucket_from_options(id: &str, opts: &Options) -> RhaiResult<Bucket> {
    let mut bucket = Bucket::new(id).map_err(to_rhai)?;
    if let Some(name) = opts.string("bucket_name")? {
        bucket = bucket.with_name(&name).map_err(to_rhai)?;
    }
    let key = opts.handle("encryption_key", ResourceKind::Key)?;
    bucket.encryption = match (opts.string("encryption")?.as_deref(), key) {
        (None | Some("kms"), Some(key)) => BucketEncryption::Kms(KeyRef::from_logical_id(key)),
        (Some("kms"), None) => return Err("s3_bucket encryption 'kms' requires 'encryption_key'".into()),
        (None | Some("s3"), None) => BucketEncryption::S3Managed,
        (Some("none"), None) => BucketEncryption::Unencrypted,
        (Some(x @ ("s3" | "none")), Some(_)) => {
            return Err(format!("s3_bucket 'encryption_key' only applies to kms encryption, found {:?}", x).into())
        }
        (Some(x), _) => return Err(format!("unknown s3_bucket encryption {:?}. Expected kms, s3 or none", x).into()),
    };
    if let Some(website) = opts.map("website")? {
        let website = Options::new("s3_bucket.website", website, &["index_document", "error_document"])?;
        bucket.website = Some(WebsiteConfiguration {
            index_document: website.string("index_document")?.unwrap_or_else(|| "index.html".into()),
            error_document: website.string("error_document")?,
        });
    }
    if let Some(block) = opts.bool("block_public_access")? {
        bucket.block_public_access = block;
    }
    Ok(bucket)
}

fn distribution_from_options(id: &str, opts: &Options) -> RhaiResult<Distribution> {
    let origin = S3Origin {
        bucket: BucketRef::from_logical_id(opts.required_handle("origin_bucket", ResourceKind::Bucket)?),
        origin_access_identity: IdentityRef::from_logical_id(
            opts.required_handle("origin_access_identity", ResourceKind::OriginAccessIdentity)?,
        ),
    };
    let mut behavior = Behavior::new(origin);
    if let Some(p) = opts.string("viewer_protocol_policy")? {
        behavior.viewer_protocol_policy = ViewerProtocolPolicy::parse(&p).map_err(to_rhai)?;
    }
    if let Some(m) = opts.string("allowed_methods")? {
        behavior.allowed_methods = AllowedMethods::parse(&m).map_err(to_rhai)?;
    }
    if let Some(c) = opts.string("cache_policy_id")? {
        behavior.cache_policy_id = c;
    }
    let mut distribution = Distribution::new(id, behavior).map_err(to_rhai)?;
    if let Some(cert) = opts.handle("certificate", ResourceKind::Certificate)? {
        let names = opts.strings("domain_names")?.unwrap_or_default();
        distribution = distribution
            .with_domain(CertificateRef::from_logical_id(cert), names)
            .map_err(to_rhai)?;
    } else if opts.map.contains_key("domain_names") {
        return Err("distribution 'domain_names' requires a 'certificate'".into());
    }
    distribution.default_root_object = opts.string("default_root_object")?;
    distribution.comment = opts.string("comment")?;
    if let Some(enabled) = opts.bool("enabled")? {
        distribution.enabled = enabled;
    }
    Ok(distribution)
}

fn record_from_options(id: &str, opts: &Options) -> RhaiResult<RecordSet> {
    let zone = ZoneRef::from_logical_id(opts.required_handle("zone", ResourceKind::HostedZone)?);
    let record_type = match opts.string("record_type")? {
        Some(t) => RecordType::parse(&t).map_err(to_rhai)?,
        None => RecordType::A,
    };
    let target = match (opts.handle("target", ResourceKind::Distribution)?, opts.strings("values")?) {
        (Some(d), None) => RecordTarget::Distribution(DistributionRef::from_logical_id(d)),
        (None, Some(values)) => RecordTarget::Values {
            values,
            ttl: opts.int("ttl")?.unwrap_or(300),
        },
        _ => return Err("record_set needs exactly one of 'target' or 'values'".into()),
    };
    let mut record = RecordSet::new(id, zone, record_type, target).map_err(to_rhai)?;
    record.record_name = opts.string("record_name")?;
    Ok(record)
}

/// register every declaration function against a shared stack.
pub fn build_engine(engine: &mut Engine, stack: Rc<RefCell<Stack>>) {
    engine.register_type_with_name::<Handle>("Handle");
    engine.register_get("id", |h: &mut Handle| -> String { h.logical_id.clone() });
    engine.register_fn("to_string", |h: &mut Handle| -> String { format!("{}({})", h.kind, h.logical_id) });

    let s = stack.clone();
    engine.register_fn("describe", move |text: &str| {
        s.borrow_mut().set_description(text);
    });

    let s = stack.clone();
    engine.register_fn("kms_key", move |id: &str| -> RhaiResult<Handle> {
        let key = Key::new(id).map_err(to_rhai)?;
        let r = s.borrow_mut().add_key(key).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::Key))
    });
    let s = stack.clone();
    engine.register_fn("kms_key", move |id: &str, opts: Map| -> RhaiResult<Handle> {
        let opts = Options::new("kms_key", opts, &["description", "enable_key_rotation"])?;
        let mut key = Key::new(id).map_err(to_rhai)?;
        key.description = opts.string("description")?;
        key.enable_key_rotation = opts.bool("enable_key_rotation")?.unwrap_or(false);
        let r = s.borrow_mut().add_key(key).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::Key))
    });

    let s = stack.clone();
    engine.register_fn("s3_bucket", move |id: &str, opts: Map| -> RhaiResult<Handle> {
        let opts = Options::new("s3_bucket", opts, &[
            "bucket_name", "encryption", "encryption_key", "website", "block_public_access",
        ])?;
        let bucket = bucket_from_options(id, &opts)?;
        let r = s.borrow_mut().add_bucket(bucket).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::Bucket))
    });

    let s = stack.clone();
    engine.register_fn("hosted_zone", move |id: &str, zone_name: &str| -> RhaiResult<Handle> {
        let zone = HostedZone::new(id, zone_name).map_err(to_rhai)?;
        let r = s.borrow_mut().add_hosted_zone(zone).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::HostedZone))
    });

    let s = stack.clone();
    engine.register_fn("certificate", move |id: &str, opts: Map| -> RhaiResult<Handle> {
        let opts = Options::new("certificate", opts, &["domain_name", "validation_zone"])?;
        let domain = opts.string("domain_name")?.ok_or_else(|| -> Box<EvalAltResult> { "certificate requires 'domain_name'".into() })?;
        let validation = match opts.handle("validation_zone", ResourceKind::HostedZone)? {
            Some(zone) => CertificateValidation::Dns(ZoneRef::from_logical_id(zone)),
            None => CertificateValidation::Email,
        };
        let cert = Certificate::new(id, &domain, validation).map_err(to_rhai)?;
        let r = s.borrow_mut().add_certificate(cert).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::Certificate))
    });

    let s = stack.clone();
    engine.register_fn("origin_access_identity", move |id: &str, comment: &str| -> RhaiResult<Handle> {
        let identity = OriginAccessIdentity::new(id, comment).map_err(to_rhai)?;
        let r = s.borrow_mut().add_origin_access_identity(identity).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::OriginAccessIdentity))
    });

    let s = stack.clone();
    engine.register_fn("grant_read", move |bucket: Handle, identity: Handle| -> RhaiResult<()> {
        let bucket = BucketRef::from_logical_id(bucket.require(ResourceKind::Bucket, "bucket")?);
        let identity = IdentityRef::from_logical_id(identity.require(ResourceKind::OriginAccessIdentity, "identity")?);
        s.borrow_mut().grant_read(&bucket, &identity).map_err(to_rhai)
    });

    let s = stack.clone();
    engine.register_fn("grant_decrypt", move |key: Handle, identity: Handle| -> RhaiResult<()> {
        let key = KeyRef::from_logical_id(key.require(ResourceKind::Key, "key")?);
        let identity = IdentityRef::from_logical_id(identity.require(ResourceKind::OriginAccessIdentity, "identity")?);
        s.borrow_mut().grant_decrypt(&key, &identity).map_err(to_rhai)
    });

    let s = stack.clone();
    engine.register_fn("distribution", move |id: &str, opts: Map| -> RhaiResult<Handle> {
        let opts = Options::new("distribution", opts, &[
            "origin_bucket", "origin_access_identity", "viewer_protocol_policy", "allowed_methods",
            "cache_policy_id", "certificate", "domain_names", "default_root_object", "comment", "enabled",
        ])?;
        let distribution = distribution_from_options(id, &opts)?;
        let r = s.borrow_mut().add_distribution(distribution).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::Distribution))
    });

    let s = stack.clone();
    engine.register_fn("record_set", move |id: &str, opts: Map| -> RhaiResult<Handle> {
        let opts = Options::new("record_set", opts, &["zone", "record_type", "target", "values", "ttl", "record_name"])?;
        let record = record_from_options(id, &opts)?;
        let r = s.borrow_mut().add_record_set(record).map_err(to_rhai)?;
        Ok(handle(r.logical_id(), ResourceKind::RecordSet))
    });

    let s = stack.clone();
    engine.register_fn("output", move |name: &str, description: &str, h: Handle| -> RhaiResult<()> {
        s.borrow_mut().add_output(name, description, get_ref(&h.logical_id)).map_err(to_rhai)
    });
    let s = stack;
    engine.register_fn("output", move |name: &str, description: &str, h: Handle, attribute: &str| -> RhaiResult<()> {
        s.borrow_mut().add_output(name, description, get_att(&h.logical_id, attribute)).map_err(to_rhai)
    });

    engine.on_print(|s| tracing::info!(target: "sitestack::script", "{s}"));
    engine.on_debug(|s, _, pos| tracing::debug!(target: "sitestack::script", %pos, "{s}"));
}

/// scope has `STACK_NAME`, `DEPLOY_REGION` and every loaded variable as constants.
pub fn create_script_scope(stack: &Stack, vars: &Variables) -> Scope<'static> {
    let mut scope = Scope::new();
    for (key, val) in vars.iter() {
        scope.push_constant(key.as_str(), val.clone());
    }
    scope.push_constant("STACK_NAME", stack.name().to_string());
    scope.push_constant("DEPLOY_REGION", stack.region().to_string());
    scope
}

/// run `source` against `stack` and return the stack with everything the script declared.
pub fn run_script(script_name: &str, source: &str, stack: Stack, vars: &Variables) -> Result<Stack> {
    let shared = Rc::new(RefCell::new(stack));
    let mut engine = Engine::new();
    engine.set_max_expr_depths(0, 0);
    build_engine(&mut engine, shared.clone());
    let ast = engine.compile(source).map_err(|e| Error::Script {
        script: script_name.to_string(),
        reason: format!("Failed to parse as rhai script. {e}"),
    })?;
    let mut scope = create_script_scope(&shared.borrow(), vars);
    engine.run_ast_with_scope(&mut scope, &ast).map_err(|e| Error::Script {
        script: script_name.to_string(),
        reason: e.to_string(),
    })?;
    drop(engine);
    let out = shared.borrow().clone();
    tracing::info!(script = script_name, declarations = out.declarations().len(), "ran declaration script");
    Ok(out)
}

#[derive(Serialize, Deserialize)]
pub struct GitHubResponse {
    pub content: String,
    pub encoding: String,
}

pub fn decode_github_content(body: GitHubResponse) -> Result<String> {
    if body.encoding == "base64" {
        let content = body.content.replace('\n', "");
        let decoded = general_purpose::STANDARD
            .decode(content)
            .map_err(|e| Error::Parse(format!("Invalid base64 content\n{e}")))?;
        Ok(String::from_utf8_lossy(&decoded).to_string())
    } else {
        Ok(body.content)
    }
}

pub fn cached_script_path(modules_dir: &Path, namespace: &str, name: &str) -> PathBuf {
    modules_dir.join(namespace).join(format!("{name}.rhai"))
}

/// `namespace:name` is looked up in `modules_dir` and otherwise downloaded
/// once from `registry` (an `owner/repo` on GitHub). anything else is a path.
pub fn resolve_script(script: &str, modules_dir: &Path, registry: Option<&str>) -> Result<String> {
    let Some((namespace, name)) = script.split_once(':') else {
        return std::fs::read_to_string(script)
            .map_err(|e| Error::Script { script: script.to_string(), reason: format!("Failed to load from file system. {e}") });
    };
    let path = cached_script_path(modules_dir, namespace, name);
    if path.exists() {
        tracing::debug!(path = %path.display(), "using cached script");
        return Ok(std::fs::read_to_string(&path)?);
    }
    let registry = registry.ok_or_else(|| Error::Script {
        script: script.to_string(),
        reason: format!("not found in {} and no registry configured. Set {REGISTRY_VAR}=owner/repo", modules_dir.display()),
    })?;
    let url = format!("https://api.github.com/repos/{registry}/contents/{namespace}/{name}.rhai");
    tracing::info!(%url, "downloading script");
    let body: GitHubResponse = ureq::get(&url)
        .set("User-Agent", "sitestack")
        .call()
        .map_err(|e| Error::Fetch(url.clone(), e.to_string()))?
        .into_json()
        .map_err(|e| Error::Fetch(url.clone(), format!("Unsuccessful response\n{e}")))?;
    let source = decode_github_content(body)?;
    // cache failures only cost a second download next time
    if let Some(dir) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create module directory");
        }
    }
    if let Err(e) = std::fs::write(&path, source.as_bytes()) {
        tracing::warn!(path = %path.display(), error = %e, "failed to cache script");
    }
    Ok(source)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stack::Declaration;

    fn run(source: &str) -> Result<Stack> {
        run_script("test.rhai", source, Stack::new("script-site", "us-east-1").unwrap(), &Variables::new())
    }

    #[test]
    fn declares_in_script_order() {
        let stack = run(r#"
            let key = kms_key("bucket-key", #{ enable_key_rotation: true });
            let bucket = s3_bucket("site", #{ encryption_key: key, website: #{} });
            let oai = origin_access_identity("oai", "reader");
            grant_read(bucket, oai);
            grant_read(bucket, oai);
        "#)
        .unwrap();
        let ids: Vec<String> = stack.declarations().iter().map(Declaration::node_id).collect();
        assert_eq!(ids, vec!["bucketkey", "site", "oai", "grant-read(site -> oai)"]);
        match &stack.declarations()[0] {
            Declaration::Key(k) => assert!(k.enable_key_rotation),
            _ => panic!("expected key"),
        }
        match &stack.declarations()[1] {
            Declaration::Bucket(b) => {
                assert_eq!(b.encryption, BucketEncryption::Kms(KeyRef::from_logical_id("bucketkey")));
                assert_eq!(b.website.as_ref().unwrap().index_document, "index.html");
            }
            _ => panic!("expected bucket"),
        }
    }

    #[test]
    fn wrong_handle_kind_is_a_script_error() {
        let err = run(r#"
            let key = kms_key("k");
            let oai = origin_access_identity("oai", "reader");
            grant_read(key, oai);
        "#)
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("s3 bucket handle"), "{msg}");
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = run(r#"s3_bucket("b", #{ colour: "blue" });"#).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn variables_are_scope_constants() {
        let mut vars = Variables::new();
        vars.set("DOMAIN_NAME", "dev2.example.com");
        let stack = run_script(
            "vars.rhai",
            r#"hosted_zone(STACK_NAME + "-zone", DOMAIN_NAME);"#,
            Stack::new("site", "us-east-1").unwrap(),
            &vars,
        )
        .unwrap();
        assert_eq!(stack.zone_name(&ZoneRef::from_logical_id("sitezone")), Some("dev2.example.com"));
    }

    #[test]
    fn parse_errors_name_the_script() {
        let err = run("let = ;").unwrap_err();
        assert!(matches!(err, Error::Script { ref script, .. } if script == "test.rhai"));
    }

    #[test]
    fn github_content_is_base64_decoded() {
        let body = GitHubResponse { content: "a2V5\n".into(), encoding: "base64".into() };
        assert_eq!(decode_github_content(body).unwrap(), "key");
        let body = GitHubResponse { content: "plain".into(), encoding: "utf-8".into() };
        assert_eq!(decode_github_content(body).unwrap(), "plain");
    }

    #[test]
    fn cached_namespaced_scripts_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = cached_script_path(dir.path(), "web", "site");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "kms_key(\"k\");").unwrap();
        assert_eq!(resolve_script("web:site", dir.path(), None).unwrap(), "kms_key(\"k\");");
        assert!(resolve_script("web:missing", dir.path(), None).is_err());
    }
}
