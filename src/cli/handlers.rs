//! Command handlers
//!
//! Each handler returns a process exit code. Generation exits non-zero when
//! any record stayed unresolved so callers can script reruns.

use crate::ai::provider::{CacheRole, Provider, ProviderKind};
use crate::ai::{HostedClient, SelfHostedClient};
use crate::cli::commands::GenerateArgs;
use crate::config::TestforgeConfig;
use crate::pipeline::stage_trait::StageOptions;
use crate::pipeline::stages::{build_stage, StageKind};
use tracing::{error, info};

pub async fn handle_generate(args: &GenerateArgs, config: TestforgeConfig) -> i32 {
    let options = StageOptions {
        from: args.from,
        to: args.to,
        instructions: args.instructions.clone(),
        no_verify: args.no_verify,
        tries: args.tries,
    };

    let stage = build_stage(args.stage, config);
    match stage.execute(&options).await {
        Ok(report) => {
            println!(
                "Stage {} complete: {} rows produced",
                report.stage, report.produced
            );
            if report.unresolved.is_empty() {
                0
            } else {
                println!(
                    "{} record(s) could not be resolved to an accepted artifact and need a rerun:",
                    report.unresolved.len()
                );
                for id in &report.unresolved {
                    println!("  - {}", id);
                }
                1
            }
        }
        Err(e) => {
            error!("Stage {} failed: {:#}", args.stage, e);
            2
        }
    }
}

pub async fn handle_cleanup(config: TestforgeConfig) -> i32 {
    let mut failures = 0;

    // Hosted caches are per role; the self-hosted knowledge collection is
    // shared, one teardown covers it.
    let mut targets: Vec<(&str, ProviderKind, CacheRole)> = Vec::new();
    if config.hosted_api_key.is_some() {
        targets.push(("hosted generator cache", ProviderKind::Hosted, CacheRole::Generator));
        targets.push(("hosted verifier cache", ProviderKind::Hosted, CacheRole::Verifier));
    }
    if config.selfhosted_base_url.is_some() && config.selfhosted_api_key.is_some() {
        targets.push((
            "self-hosted knowledge collection",
            ProviderKind::SelfHosted,
            CacheRole::Generator,
        ));
    }

    if targets.is_empty() {
        println!("No provider credentials configured; nothing to clean up");
        return 0;
    }

    for (label, kind, role) in targets {
        // Model id is irrelevant for teardown
        match config.build_provider(kind, "cleanup", role) {
            Ok(provider) => match provider.teardown().await {
                Ok(()) => info!("Cleaned up {}", label),
                Err(e) => {
                    error!("Cleanup of {} failed: {}", label, e);
                    failures += 1;
                }
            },
            Err(e) => {
                error!("Cannot build provider for {}: {}", label, e);
                failures += 1;
            }
        }
    }

    println!("Clean-up complete");
    if failures == 0 {
        0
    } else {
        1
    }
}

pub async fn handle_health(config: TestforgeConfig) -> i32 {
    let mut checked = 0;
    let mut healthy = 0;

    if let (Some(base_url), Some(api_key)) = (
        config.selfhosted_base_url.clone(),
        config.selfhosted_api_key.clone(),
    ) {
        checked += 1;
        let model = config
            .stage_tuning(StageKind::Cases)
            .map(|t| t.model)
            .unwrap_or_else(|_| "gpt-oss:20b".to_string());
        let client = SelfHostedClient::new(
            base_url,
            api_key,
            model,
            config.module.clone(),
            config.knowledge_dir.clone(),
        );
        match client.health_check().await {
            Ok(true) => {
                healthy += 1;
                println!(
                    "self-hosted: ok ({})",
                    client.model_info().unwrap_or_default()
                );
            }
            Ok(false) => println!("self-hosted: unreachable"),
            Err(e) => println!("self-hosted: error ({})", e),
        }
    }

    if let Some(api_key) = config.hosted_api_key.clone() {
        checked += 1;
        let model = config
            .stage_tuning(StageKind::Dimensions)
            .map(|t| t.model)
            .unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let client = HostedClient::new(
            api_key,
            model.clone(),
            CacheRole::Generator,
            config.module.clone(),
            config.knowledge_dir.clone(),
            config.cache_manager(),
        );
        match client.health_check().await {
            Ok(true) => {
                healthy += 1;
                println!("hosted: ok ({})", model);
            }
            Ok(false) => println!("hosted: unreachable"),
            Err(e) => println!("hosted: error ({})", e),
        }
    }

    if checked == 0 {
        println!("No provider credentials configured");
        return 1;
    }

    if healthy == checked {
        0
    } else {
        1
    }
}
