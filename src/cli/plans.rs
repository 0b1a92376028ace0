use super::{Services, open_store};
use crate::error::{AppError, Result};
use crate::plans::{CreationStage, PlanIndex, PlanRecord};
use clap::Subcommand;
use dialoguer::Confirm;
use indicatif::ProgressStyle;
use tracing::{Span, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

#[derive(Subcommand, Debug)]
pub enum PlansCommand {
    /// Create a new account plan
    Create {
        name: String,
        /// URL of the browser tab the request came from
        #[arg(long)]
        current_tab: Option<String>,
        /// Copy this template file instead of adding a tab
        #[arg(long)]
        from_template: Option<String>,
    },
    /// List recent account plans
    List {
        /// Ask Google instead of using local state
        #[arg(long)]
        refresh: bool,
    },
    /// Find account plans by name
    Search { query: String },
    /// Delete an account plan
    Delete {
        name: String,
        /// Don't ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Rebuild the overview sheet
    RefreshOverview,
}

impl PlansCommand {
    pub async fn execute(&self, offline: bool) -> Result<()> {
        match self {
            PlansCommand::Create {
                name,
                current_tab,
                from_template,
            } => {
                create(
                    name,
                    current_tab.as_deref(),
                    from_template.as_deref(),
                    offline,
                )
                .await
            }
            PlansCommand::List { refresh } => list(*refresh, offline).await,
            PlansCommand::Search { query } => search(query).await,
            PlansCommand::Delete { name, yes } => delete(name, *yes, offline).await,
            PlansCommand::RefreshOverview => refresh_overview(offline).await,
        }
    }
}

#[instrument(name = "Creating account plan", skip_all)]
async fn create(
    name: &str,
    current_tab: Option<&str>,
    from_template: Option<&str>,
    offline: bool,
) -> Result<()> {
    let services = Services::connect(offline).await?;
    let workflow = services.workflow()?;

    let span = Span::current();
    span.pb_set_style(
        &ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map_err(|e| AppError::Other(e.to_string()))?,
    );
    span.pb_set_length(CreationStage::STEPS);

    let observer = move |stage: &CreationStage| {
        span.pb_set_position(stage.position());
        span.pb_set_message(&stage.to_string());
        if let CreationStage::Error(message) = stage {
            warn!("{}", message);
        }
    };

    let template = from_template.or(services.config.sheets.template_id.as_deref());
    match template {
        Some(template_id) => {
            let copied = workflow
                .create_plan_from_template(name, template_id, &observer)
                .await?;
            info!(url = %copied.url, "Account plan copied from template");
        }
        None => {
            let created = workflow.create_plan(name, current_tab, &observer).await?;
            let navigation = match created.is_inline_navigation {
                true => "current tab",
                false => "new tab",
            };
            info!(url = %created.spreadsheet_url, navigation, "Account plan ready");
        }
    }

    Ok(())
}

fn print_plans(plans: &[PlanRecord]) {
    if plans.is_empty() {
        info!("No account plans found");
    }
    for plan in plans {
        info!(
            name = %plan.name,
            created = %plan.created_at.format("%Y-%m-%d"),
            url = %plan.url,
            "Plan"
        );
    }
}

async fn list(refresh: bool, offline: bool) -> Result<()> {
    let services = Services::connect(offline).await?;
    let plans = services.workflow()?.list_plans(refresh).await?;
    print_plans(&plans);
    Ok(())
}

async fn search(query: &str) -> Result<()> {
    let index = PlanIndex::new(open_store()?);
    let plans = index.search(query).await?;
    print_plans(&plans);
    Ok(())
}

async fn delete(name: &str, yes: bool, offline: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete account plan '{}'?", name))
            .default(false)
            .interact()
            .map_err(|e| AppError::Other(format!("Failed to read confirmation: {}", e)))?;
        if !confirmed {
            info!("Cancelled");
            return Ok(());
        }
    }

    let services = Services::connect(offline).await?;
    let outcome = services.workflow()?.delete_plan(name).await?;

    match outcome.overview_updated {
        true => info!("Account plan deleted"),
        false => warn!("Account plan deleted, but the overview could not be updated"),
    }
    Ok(())
}

async fn refresh_overview(offline: bool) -> Result<()> {
    let services = Services::connect(offline).await?;

    match services.workflow()?.refresh_overview().await? {
        true => info!("Overview refreshed"),
        false => warn!("Overview could not be refreshed"),
    }
    Ok(())
}
