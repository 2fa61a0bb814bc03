use clap::Parser;
use search_tailor::adapters::memory_page::PageFixture;
use search_tailor::config::cli::DEFAULT_STORE_PATH;
use search_tailor::config::{CliConfig, Command};
use search_tailor::core::treatment;
use search_tailor::domain::ports::Page;
use search_tailor::utils::error::ErrorSeverity;
use search_tailor::utils::{logger, validation::validate_url, validation::Validate};
use search_tailor::{
    EngineRegistry, LocalStore, MemoryPage, SessionState, SyncedRuleStore, TailorConfig,
    TailoringSession, TreatmentStyles,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI config: {:?}", cli);

    let config = match &cli.config {
        Some(path) => match TailorConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config file '{}': {}", path, e);
                eprintln!("💡 Make sure the file exists and is valid TOML format");
                std::process::exit(1);
            }
        },
        None => TailorConfig::default(),
    };

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    if let Err(e) = run(&cli, &config).await {
        tracing::error!(
            "search-tailor failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(cli: &CliConfig, config: &TailorConfig) -> search_tailor::Result<()> {
    let store_path = cli
        .store
        .clone()
        .or_else(|| config.store_path().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string());
    tracing::debug!("Using entry store at {}", store_path);

    let rule_store = config.rule_store(LocalStore::new(&store_path));
    let registry = config.registry()?;
    let styles = config.styles();

    match &cli.command {
        Command::Tailor { page, with_styles } => {
            tailor_page(page, *with_styles, &registry, rule_store, &styles).await
        }
        Command::List => {
            for entry in rule_store.entries().await? {
                println!("{}\t{}\t{}", entry.id, entry.treatment, entry.domain);
            }
            Ok(())
        }
        Command::Add { domain, treatment } => {
            let entry = rule_store.add_entry(domain, *treatment).await?;
            println!("✅ Added {} ({}) as {}", entry.domain, entry.treatment, entry.id);
            Ok(())
        }
        Command::Remove { id } => {
            if rule_store.remove_entry(id).await? {
                println!("✅ Removed {}", id);
            } else {
                println!("No entry with id {}", id);
            }
            Ok(())
        }
        Command::Engines { url } => {
            print_engines(&registry, url.as_deref());
            Ok(())
        }
        Command::Stylesheet => {
            print!("{}", styles.stylesheet());
            Ok(())
        }
    }
}

async fn tailor_page(
    path: &str,
    with_styles: bool,
    registry: &EngineRegistry,
    rule_store: SyncedRuleStore<LocalStore>,
    styles: &TreatmentStyles,
) -> search_tailor::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let fixture: PageFixture = serde_json::from_str(&content)?;
    validate_url("page.url", &fixture.url)?;

    let page = Arc::new(MemoryPage::from_fixture(&fixture));
    let session = TailoringSession::bind(page.clone(), Arc::new(rule_store), registry).await;

    if session.state() == SessionState::Unbound {
        println!("No supported search engine matches {}", fixture.url);
        return Ok(());
    }
    let Some(engine) = session.engine() else {
        return Ok(());
    };

    // Second pass so a failed rule read reaches the user instead of the log.
    let report = session.retailor().await?;
    println!(
        "🔎 {}: {} results, {} tailored",
        engine.name,
        report.results,
        report.applied.len()
    );

    let selectors = &engine.selectors;
    if let Some(container) = page.query_selector(None, &selectors.result_container) {
        for (index, result) in page
            .query_selector_all(Some(container), &selectors.result)
            .into_iter()
            .enumerate()
        {
            let link = page
                .query_selector(Some(result), &selectors.result_link)
                .and_then(|link| page.link_text(link))
                .unwrap_or_else(|| "(no link)".to_string());
            let marker = treatment::markers(page.as_ref(), result)
                .first()
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:>3}  {:<9}  {}", index + 1, marker, link);
        }
    }

    if with_styles {
        println!();
        print!("{}", styles.stylesheet());
    }

    Ok(())
}

fn print_engines(registry: &EngineRegistry, url: Option<&str>) {
    match url {
        Some(url) => {
            let candidates = registry.candidates(url);
            match candidates.split_first() {
                Some((selected, shadowed)) => {
                    println!("{} resolves to {}", url, selected.name);
                    for engine in shadowed {
                        println!("  also matches {} (registered later, ignored)", engine.name);
                    }
                }
                None => println!("{} matches no engine", url),
            }
        }
        None => {
            for engine in registry.engines() {
                println!(
                    "{}\t{}\tcontainer={} result={} link={}{}",
                    engine.name,
                    engine.match_pattern.as_str(),
                    engine.selectors.result_container,
                    engine.selectors.result,
                    engine.selectors.result_link,
                    if engine.observe_mutations { " (async)" } else { "" }
                );
            }
        }
    }
}
