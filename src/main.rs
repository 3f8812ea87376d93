use clap::Parser;
use nocloud_provision::utils::{logger, validation::Validate};
use nocloud_provision::{CliConfig, Provisioner, Systemctl};

const EXIT_FATAL: i32 = 1;
const EXIT_PACKAGE_FAILURES: i32 = 2;

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting nocloud-provision");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(EXIT_FATAL);
    }

    if config.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let provisioner = Provisioner::new(config.to_settings(), Systemctl::new(&config.systemctl));

    let token = provisioner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, cancelling provisioning");
            token.cancel();
        }
    });

    let report = match provisioner.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(
                "❌ Provisioning aborted: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(EXIT_FATAL);
        }
    };

    report.log_summary();

    if let Some(path) = &config.report {
        if let Err(e) = report.write_json(path) {
            tracing::error!("❌ Failed to write report to {}: {}", path, e);
            eprintln!("❌ {}", e.user_friendly_message());
        }
    }

    if report.dry_run {
        println!("🧪 Dry run: {} package(s) listed", report.packages.len());
        return;
    }

    println!(
        "✅ Provisioning finished: {} succeeded, {} failed",
        report.succeeded_count(),
        report.failed_count()
    );

    if config.strict && report.has_failures() {
        tracing::warn!("⚠️ --strict: {} package(s) failed", report.failed_count());
        std::process::exit(EXIT_PACKAGE_FAILURES);
    }
}
