mod cli;

use anyhow::Context as _;
use indexmap::IndexMap;
use papiline::converter::ConverterRuleSet;
use papiline::edgegrid::{self, Credentials, SignableRequest};
use papiline::json_source;
use papiline::rule_tree::RuleTree;
use papiline::template::{ProcessOptions, TemplateBundle, TemplateEngine};
use papiline::value::Value;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("PAPILINE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Convert(convert_cli) => convert(convert_cli),
        cli::Command::Merge(merge_cli) => merge(merge_cli),
        cli::Command::Sign(sign_cli) => sign(sign_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn convert(cli: cli::ConvertCommand) -> anyhow::Result<()> {
    let tree: RuleTree = json_source::load_file(&cli.rule_tree)?;
    let converter: ConverterRuleSet = json_source::load_file(&cli.converter)?;

    let engine = TemplateEngine::new(converter);
    let bundle = engine.process(
        &tree,
        &ProcessOptions {
            product_id: cli.product,
            variable_mode: cli.mode.into(),
            is_for_new_property: cli.new_property,
        },
    )?;

    bundle.write_to(&cli.out)?;
    println!(
        "wrote main + {} include template(s) to {}",
        bundle.templates.len(),
        cli.out.display()
    );
    Ok(())
}

pub fn merge(cli: cli::MergeCommand) -> anyhow::Result<()> {
    let bundle = TemplateBundle::read_from(&cli.dir)?;

    let mut env = bundle.env_variables.clone();
    if let Some(env_file) = &cli.env_file {
        let overrides: IndexMap<String, Value> = json_source::load_file(env_file)?;
        env.extend(overrides);
    }
    let context = Value::Object(IndexMap::from_iter([(
        "env".to_string(),
        Value::Object(env),
    )]));

    let tree = papiline::merge::merge(&bundle.main, &bundle.templates, &context)?;
    output(&cli.output, &tree)?;
    Ok(())
}

fn output<T: serde::Serialize>(output: &cli::OutputArgs, value: &T) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

pub fn sign(cli: cli::SignCommand) -> anyhow::Result<()> {
    let credentials: Credentials = json_source::load_file(&cli.credentials)?;

    let mut request = SignableRequest::new(cli.method, cli.path);
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header '{header}' must look like 'Name: value'"))?;
        request
            .headers
            .insert(name.trim().to_string(), value.trim().to_string());
    }
    request.headers_to_sign = cli.sign_headers;
    if let Some(body_path) = &cli.body {
        request.body = Some(json_source::load_file(body_path)?);
    }

    let signed = edgegrid::sign(request, &credentials)?;

    println!(
        "{}",
        signed
            .headers
            .get("Authorization")
            .expect("sign always sets the Authorization header")
    );
    if let Some(url) = &signed.url {
        println!("{url}");
    }
    Ok(())
}
