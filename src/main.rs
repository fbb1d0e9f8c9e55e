use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sitestack::output::write_outputs;
use sitestack::{load_stack, LoadOptions};
use tracing_subscriber::EnvFilter;

/// Declare a static website on AWS and synthesize its CloudFormation template.
#[derive(Parser, Debug)]
#[command(name = "sitestack")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Declaration script: a path, or `namespace:name`
    #[arg(long, global = true)]
    script: Option<String>,

    /// .env file to load (defaults to ./.env when present)
    #[arg(long = "env", global = true)]
    env_file: Option<PathBuf>,

    /// Attribute map overriding .env values, eg: '{ domain_name: "dev2.example.com" }'
    #[arg(long, global = true)]
    params: Option<String>,

    /// Directory deploy.json and deploy.sh are written to
    #[arg(long = "out", global = true, default_value = ".")]
    out_dir: PathBuf,

    /// Directory deploy.sh syncs into the bucket
    #[arg(long, global = true)]
    site_dir: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
enum Command {
    /// Validate and write deploy.json and deploy.sh
    Synth,
    /// Validate only and print the creation order
    Check,
    /// Print the dependency order and whether declaration order satisfies it
    Order,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            script: self.script.clone(),
            env_file: self.env_file.clone(),
            params: self.params.clone(),
            modules_dir: None,
        }
    }
}

/// `RUST_LOG` if set, otherwise `SITESTACK_LOG`, otherwise `info`.
fn init_tracing() -> Result<(), String> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = std::env::var("SITESTACK_LOG").unwrap_or_else(|_| "info".into());
        EnvFilter::try_new(&level).map_err(|e| format!("invalid log level filter: {level}\n{e}"))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
    Ok(())
}

fn run(args: Cli) -> sitestack::Result<()> {
    let stack = load_stack(&args.load_options())?;
    match args.command {
        Command::Synth => {
            let template = stack.synthesize()?;
            let files = write_outputs(&template, &stack, &args.out_dir, args.site_dir.as_deref())?;
            println!("Wrote {} and {}", files.template.display(), files.deploy_script.display());
        }
        Command::Check => {
            let order = stack.validate()?;
            println!("{} is valid. Creation order:", stack.name());
            for id in &order.order {
                println!("  {id}");
            }
        }
        Command::Order => {
            let order = stack.validate()?;
            for id in &order.order {
                println!("{id}");
            }
            println!("declaration order is topological: {}", order.declaration_order_is_topological);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing() {
        eprintln!("{e}");
        std::process::exit(1);
    }
    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(s: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("sitestack").chain(s.split_whitespace()))
    }

    #[test]
    fn parses_flags() {
        let a = args("synth --script web:site --env prod.env --out build --site-dir public").unwrap();
        assert_eq!(a.command, Command::Synth);
        assert_eq!(a.script.as_deref(), Some("web:site"));
        assert_eq!(a.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(a.out_dir, PathBuf::from("build"));
        assert_eq!(a.site_dir.as_deref(), Some("public"));
        assert_eq!(a.load_options().script.as_deref(), Some("web:site"));
    }

    #[test]
    fn flags_before_the_subcommand() {
        let a = args("--script demo.rhai order").unwrap();
        assert_eq!(a.command, Command::Order);
        assert_eq!(a.script.as_deref(), Some("demo.rhai"));
        assert_eq!(a.out_dir, PathBuf::from("."));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(args("").is_err());
        assert!(args("deploy").is_err());
        assert!(args("check --script").is_err());
        assert!(args("order --colour blue").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
