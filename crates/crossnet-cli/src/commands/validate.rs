//! Validate command

use clap::{Args, Subcommand};

use crossnet_common::OPERATOR_NAMESPACE;
use crossnet_validate::{
    validate_deployment, ClusterHandle, ClusterValidation, ValidateConfig, ValidationSummary,
};

use crate::config::ClusterArgs;
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(subcommand)]
    pub command: ValidateCommand,
}

#[derive(Subcommand, Debug)]
pub enum ValidateCommand {
    /// Check that the mesh components are running with no overlapping CIDRs
    Deployment(DeploymentArgs),
}

#[derive(Args, Debug)]
pub struct DeploymentArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Namespace the mesh components run in
    #[arg(long, default_value = OPERATOR_NAMESPACE)]
    pub operator_namespace: String,
}

pub async fn run(args: ValidateArgs) -> Result<()> {
    match args.command {
        ValidateCommand::Deployment(args) => validate_deployment_cmd(args).await,
    }
}

async fn validate_deployment_cmd(args: DeploymentArgs) -> Result<()> {
    let config = ValidateConfig {
        operator_namespace: args.operator_namespace.clone(),
    };

    let handles: Vec<ClusterHandle> = args
        .cluster
        .connect_all()
        .await?
        .into_iter()
        .map(|target| ClusterHandle::kube(target.name, target.client))
        .collect();

    let summary = validate_deployment(&handles, &config).await?;
    for line in report_lines(&summary) {
        println!("{}", line);
    }

    if summary.passed() {
        Ok(())
    } else {
        let failed = summary.clusters.iter().filter(|c| !c.passed()).count();
        Err(crate::Error::validation(format!(
            "{} of {} clusters failed validation",
            failed,
            summary.clusters.len()
        )))
    }
}

/// Human-readable report of a validation run
pub fn report_lines(summary: &ValidationSummary) -> Vec<String> {
    let mut lines = Vec::new();
    for warning in &summary.warnings {
        lines.push(format!("WARNING: {}", warning));
    }
    for cluster in &summary.clusters {
        lines.extend(cluster_lines(cluster));
    }
    if summary.passed() {
        lines.push("All validations passed".to_string());
    }
    lines
}

fn cluster_lines(cluster: &ClusterValidation) -> Vec<String> {
    let mut lines = vec![format!(
        "Cluster {} (cluster ID {}):",
        cluster.cluster, cluster.cluster_id
    )];

    match &cluster.health.failure {
        None => lines.push("  ok    all mesh pods are up and running".to_string()),
        Some(finding) => lines.push(format!("  FAIL  {}", finding)),
    }

    let status = if cluster.overlap.passed() { "ok  " } else { "FAIL" };
    lines.push(format!("  {}  {}", status, cluster.overlap.message()));
    lines
}
