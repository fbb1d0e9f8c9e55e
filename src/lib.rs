use std::path::{Path, PathBuf};

pub mod error;
pub mod grants;
pub mod module_scripting;
pub mod output;
pub mod parsing;
pub mod regions;
pub mod resources;
pub mod stack;
pub mod static_website;
pub mod template;
pub mod variables;

pub use error::{Error, Result};
pub use stack::{DependencyOrder, Stack};
pub use template::Template;

use parsing::{parse_attribute_str, AttributeValue};
use stack::{derive_stack_name, DEFAULT_REGION};
use static_website::StaticWebsite;
use variables::Variables;

pub const DEFAULT_ENV_FILE: &str = ".env";

/// where a stack comes from and what it is configured with.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// a script path or `namespace:name`. the built-in static website when `None`.
    pub script: Option<String>,
    /// `.env` to load. `./.env` is used if it exists and this is `None`.
    pub env_file: Option<PathBuf>,
    /// attribute map that overrides `.env` values.
    pub params: Option<String>,
    pub modules_dir: Option<PathBuf>,
}

pub fn load_variables(env_file: Option<&Path>) -> Result<Variables> {
    let mut vars = Variables::new();
    match env_file {
        Some(path) => vars.load_dot_env(path)?,
        None => {
            let default = Path::new(DEFAULT_ENV_FILE);
            if default.exists() {
                vars.load_dot_env(default)?;
            }
        }
    }
    Ok(vars)
}

/// declare the stack named by `options`. nothing is validated yet.
pub fn load_stack(options: &LoadOptions) -> Result<Stack> {
    let mut vars = load_variables(options.env_file.as_deref())?;
    let params = match &options.params {
        Some(p) => Some(parse_attribute_str(p, &vars)?),
        None => None,
    };

    let Some(script) = &options.script else {
        let mut site = StaticWebsite::from_variables(&vars);
        if let Some(params) = params {
            site.apply_attributes(params)?;
        }
        return site.build();
    };

    // scripts see params the same way they see .env entries
    if let Some(params) = params {
        for (key, val) in params.assert_map("params")? {
            match val {
                AttributeValue::Str(s) => vars.set(&key, &s),
                x => return Err(Error::invalid_attribute(key, format!("script params must be strings, found {:?}", x))),
            }
        }
    }
    let modules_dir = options.modules_dir.clone().unwrap_or_else(|| PathBuf::from(module_scripting::MODULES_DIR));
    let registry = std::env::var(module_scripting::REGISTRY_VAR).ok();
    let source = module_scripting::resolve_script(script, &modules_dir, registry.as_deref())?;

    let stack_name = match vars.get("STACK_NAME") {
        Some(name) => name.to_string(),
        None => derive_stack_name(&script_stem(script))?,
    };
    let stack = Stack::new(&stack_name, vars.get_or("DEPLOY_REGION", DEFAULT_REGION))?;
    module_scripting::run_script(script, &source, stack, &vars)
}

/// `web:static_site` and `./demos/static_site.rhai` both give `static_site`.
fn script_stem(script: &str) -> String {
    if let Some((_, name)) = script.split_once(':') {
        return name.to_string();
    }
    Path::new(script)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| script.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn script_stem_strips_namespace_and_extension() {
        assert_eq!(script_stem("web:static_site"), "static_site");
        assert_eq!(script_stem("./demos/static_site.rhai"), "static_site");
    }

    #[test]
    fn params_override_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("site.env");
        std::fs::write(&env, "DEPLOY_ENVIRONMENT=prod\nDOMAIN_NAME=www.example.com\n").unwrap();
        let stack = load_stack(&LoadOptions {
            env_file: Some(env),
            params: Some(r#"{ domain_name: "shop.example.com" }"#.into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(stack.name(), "prod-static-website");
        assert!(stack.distributions().all(|d| d.domain_names == vec!["shop.example.com".to_string()]));
    }

    #[test]
    fn script_params_become_constants() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("zone_only.rhai");
        std::fs::write(&script, "hosted_zone(\"zone\", ZONE);").unwrap();
        let env = dir.path().join("empty.env");
        std::fs::write(&env, "").unwrap();
        let stack = load_stack(&LoadOptions {
            script: Some(script.display().to_string()),
            env_file: Some(env),
            params: Some(r#"{ ZONE: "dev2.example.com" }"#.into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(stack.name(), "zone-only");
        assert_eq!(stack.declarations().len(), 1);
    }
}
