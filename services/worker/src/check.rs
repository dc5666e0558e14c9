use clap::Args;
use codegate::config::AppConfig;
use codegate::error::AppError;
use codegate::telemetry;
use codegate::workflows::submissions::domain::flatten_rules;
use codegate::workflows::submissions::{ArchiveLoader, Rule, RuleEngine, RuleSet};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// Archive URL or local path
    #[arg(long)]
    pub(crate) archive: String,
    /// JSON file holding either a list of rule sets or a bare list of rules
    #[arg(long)]
    pub(crate) rules: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RulesFile {
    RuleSets(Vec<RuleSet>),
    Rules(Vec<Rule>),
}

impl RulesFile {
    fn into_rules(self) -> Vec<Rule> {
        match self {
            RulesFile::RuleSets(rule_sets) => flatten_rules(&rule_sets),
            RulesFile::Rules(rules) => rules,
        }
    }
}

fn read_rules(raw: &str) -> Result<Vec<Rule>, AppError> {
    let file: RulesFile = serde_json::from_str(raw)?;
    Ok(file.into_rules())
}

pub(crate) async fn run_check(args: CheckArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let rules = read_rules(&std::fs::read_to_string(&args.rules)?)?;
    let loader = ArchiveLoader::new(&config.archive)?;
    let files = loader.load(&args.archive).await?;
    let result = RuleEngine::new().evaluate(&files, &rules)?;

    let report = json!({
        "archive": args.archive,
        "files": files.len(),
        "status": result.verdict(),
        "results": result,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
