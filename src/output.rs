use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::stack::{bucket_output_key, distribution_id_output_key, Stack};
use crate::template::Template;

pub const TEMPLATE_FILE: &str = "deploy.json";
pub const DEPLOY_SCRIPT_FILE: &str = "deploy.sh";

/// where the site files go once the stack exists.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteUpload {
    pub site_dir: String,
    /// stack output holding the bucket name.
    pub bucket_output: String,
    /// stack output holding the distribution id, invalidated after the sync.
    pub distribution_output: Option<String>,
}

impl SiteUpload {
    /// the first bucket and distribution of the stack.
    pub fn for_stack(stack: &Stack, site_dir: &str) -> Result<Self> {
        let bucket = stack.buckets().next().ok_or_else(|| {
            Error::invalid_attribute("site_dir", format!("stack '{}' declares no bucket to upload into", stack.name()))
        })?;
        Ok(Self {
            site_dir: site_dir.to_string(),
            bucket_output: bucket_output_key(&bucket.logical_id),
            distribution_output: stack.distributions().next().map(|d| distribution_id_output_key(&d.logical_id)),
        })
    }
}

fn stack_output(stack_name: &str, region: &str, output: &str) -> String {
    format!(
        "$(aws --region {region} cloudformation describe-stacks --stack-name {stack_name} --query \"Stacks[0].Outputs[?OutputKey=='{output}'].OutputValue\" --output text)"
    )
}

pub fn deploy_script(stack_name: &str, region: &str, template_file: &str, upload: Option<&SiteUpload>) -> String {
    let mut out = String::from("#!/usr/bin/env bash\n\nset -e\n");
    out.push_str("\n# deploy:\n");
    out.push_str(&format!(
        "AWS_REGION={region} aws --region {region} cloudformation deploy --stack-name {stack_name} --template-file {template_file} --capabilities CAPABILITY_NAMED_IAM\n"
    ));
    if let Some(upload) = upload {
        out.push_str("\n# upload:\n");
        out.push_str(&format!("BUCKET={}\n", stack_output(stack_name, region, &upload.bucket_output)));
        out.push_str(&format!("aws --region {region} s3 sync --delete {} \"s3://$BUCKET\"\n", upload.site_dir));
        if let Some(distribution) = &upload.distribution_output {
            out.push_str(&format!("DISTRIBUTION_ID={}\n", stack_output(stack_name, region, distribution)));
            out.push_str("aws cloudfront create-invalidation --distribution-id \"$DISTRIBUTION_ID\" --paths \"/*\"\n");
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub template: PathBuf,
    pub deploy_script: PathBuf,
}

/// write `deploy.json` and an executable `deploy.sh` into `out_dir`.
pub fn write_outputs(template: &Template, stack: &Stack, out_dir: &Path, site_dir: Option<&str>) -> Result<OutputFiles> {
    fs::create_dir_all(out_dir)?;
    let template_path = out_dir.join(TEMPLATE_FILE);
    fs::write(&template_path, template.to_json_pretty()?)?;

    let upload = site_dir.map(|dir| SiteUpload::for_stack(stack, dir)).transpose()?;
    // deploy.sh runs from out_dir
    let script = deploy_script(stack.name(), stack.region(), &format!("./{TEMPLATE_FILE}"), upload.as_ref());
    let script_path = out_dir.join(DEPLOY_SCRIPT_FILE);
    fs::write(&script_path, script)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms)?;
    }
    tracing::info!(template = %template_path.display(), script = %script_path.display(), "wrote deployment files");
    Ok(OutputFiles { template: template_path, deploy_script: script_path })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::static_website::StaticWebsite;

    #[test]
    fn deploy_only_script() {
        let s = deploy_script("test-static-website", "us-east-1", "./deploy.json", None);
        assert!(s.starts_with("#!/usr/bin/env bash\n"));
        assert!(s.contains("cloudformation deploy --stack-name test-static-website --template-file ./deploy.json --capabilities CAPABILITY_NAMED_IAM"));
        assert!(!s.contains("s3 sync"));
    }

    #[test]
    fn upload_syncs_and_invalidates() {
        let stack = StaticWebsite::default().build().unwrap();
        let upload = SiteUpload::for_stack(&stack, "./public").unwrap();
        assert_eq!(upload.bucket_output, "s3bucketName");
        assert_eq!(upload.distribution_output.as_deref(), Some("distroId"));
        let s = deploy_script(stack.name(), stack.region(), "./deploy.json", Some(&upload));
        assert!(s.contains("OutputKey=='s3bucketName'"));
        assert!(s.contains("s3 sync --delete ./public \"s3://$BUCKET\""));
        assert!(s.contains("create-invalidation --distribution-id \"$DISTRIBUTION_ID\""));
    }

    #[test]
    fn upload_needs_a_bucket() {
        let stack = Stack::new("empty", "us-east-1").unwrap();
        assert!(SiteUpload::for_stack(&stack, "./public").is_err());
    }

    #[test]
    fn writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let stack = StaticWebsite::default().build().unwrap();
        let template = stack.synthesize().unwrap();
        let files = write_outputs(&template, &stack, &dir.path().join("out"), Some("./public")).unwrap();
        let written = Template::from_json(&fs::read_to_string(&files.template).unwrap()).unwrap();
        assert_eq!(written, template);
        assert!(fs::read_to_string(&files.deploy_script).unwrap().contains("# upload:"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&files.deploy_script).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
