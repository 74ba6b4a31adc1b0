//! Hands a synthesized assembly to CloudFormation and reads back its outputs.

use std::collections::BTreeMap;
use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_sdk_cloudformation::model::{Capability, Output, Tag};
use aws_sdk_cloudformation::types::SdkError;
use aws_types::region::Region;
use futures::future::try_join_all;

use crate::assembly::CloudAssembly;
use crate::config::Environment;
use crate::stack::Stack;
use crate::writer::StackOutputs;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const MAX_POLLS: u32 = 360;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error ocurred: {0}.")]
    ServiceError(String),

    #[error("Unknown error ocurred: {0}.")]
    UnknownError(String),

    #[error("Stack not found")]
    NotFoundError(String),

    #[error("Stack {stack} ended in {status}")]
    StackFailed { stack: String, status: String },

    #[error("Gave up waiting for stack {0}")]
    Timeout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Succeeded,
    Failed,
}

/// Maps a CloudFormation stack status onto where the operation stands.
pub fn phase(status: &str) -> StackPhase {
    if status.ends_with("_IN_PROGRESS") {
        return StackPhase::InProgress;
    }
    if status.ends_with("_FAILED") || status.ends_with("ROLLBACK_COMPLETE") {
        return StackPhase::Failed;
    }
    if status.ends_with("_COMPLETE") {
        return StackPhase::Succeeded;
    }
    StackPhase::Failed
}

pub struct Deployer {
    client: aws_sdk_cloudformation::Client,
    tags: BTreeMap<String, String>,
}

impl Deployer {
    pub async fn new(environment: &Environment, tags: BTreeMap<String, String>) -> Self {
        let region = environment.region.clone().map(Region::new);
        let region_provider = RegionProviderChain::first_try(region).or_default_provider();

        let sdk_config = aws_config::from_env().region(region_provider).load().await;
        if let Some(account) = &environment.account {
            tracing::debug!(account = %account, "deploying with the ambient credentials");
        }
        tracing::info!(region = ?sdk_config.region(), "CloudFormation client ready");

        let client = aws_sdk_cloudformation::Client::new(&sdk_config);
        return Self { client, tags };
    }

    /// Deploys the assembly wave by wave; stacks in one wave go out together.
    pub async fn deploy(&self, assembly: &CloudAssembly) -> Result<StackOutputs, Error> {
        let mut outputs = StackOutputs::new();
        for (number, wave) in assembly.waves().into_iter().enumerate() {
            tracing::info!(
                wave = number,
                stacks = ?wave.iter().map(|stack| stack.name.as_str()).collect::<Vec<_>>(),
                "deploying wave"
            );
            let deployed =
                try_join_all(wave.into_iter().map(|stack| self.deploy_stack(stack))).await?;
            outputs.extend(deployed);
        }

        return Ok(outputs);
    }

    /// Deletes the stacks in reverse dependency order.
    pub async fn destroy(&self, assembly: &CloudAssembly) -> Result<(), Error> {
        for wave in assembly.waves().into_iter().rev() {
            try_join_all(wave.into_iter().map(|stack| self.destroy_stack(&stack.name))).await?;
        }

        return Ok(());
    }

    pub async fn collect_outputs(&self, assembly: &CloudAssembly) -> Result<StackOutputs, Error> {
        let names: Vec<&str> = assembly.stacks().map(|stack| stack.name.as_str()).collect();
        let collected = try_join_all(names.iter().map(|name| async move {
            let outputs = self.get_outputs(name).await?;
            Ok::<_, Error>((name.to_string(), outputs_to_map(&outputs)))
        }))
        .await?;

        return Ok(collected.into_iter().collect());
    }

    async fn deploy_stack(
        &self,
        stack: &Stack,
    ) -> Result<(String, BTreeMap<String, String>), Error> {
        let body = stack
            .template
            .to_json()
            .map_err(|error| Error::UnknownError(error.to_string()))?;

        let existing = match self.stack_status(&stack.name).await {
            Ok(status) => Some(status),
            Err(Error::NotFoundError(_)) => None,
            Err(error) => return Err(error),
        };

        match existing.as_deref() {
            None => {
                tracing::info!(stack = %stack.name, "creating stack");
                self.client
                    .create_stack()
                    .stack_name(&stack.name)
                    .template_body(body)
                    .capabilities(Capability::CapabilityNamedIam)
                    .set_tags(Some(self.stack_tags()))
                    .send()
                    .await
                    .map_err(classify)?;
            }
            Some(status) if status == "ROLLBACK_COMPLETE" => {
                // A stack that failed its first creation cannot be updated.
                return Err(Error::StackFailed {
                    stack: stack.name.clone(),
                    status: status.to_string(),
                });
            }
            Some(_) => {
                tracing::info!(stack = %stack.name, "updating stack");
                let result = self
                    .client
                    .update_stack()
                    .stack_name(&stack.name)
                    .template_body(body)
                    .capabilities(Capability::CapabilityNamedIam)
                    .set_tags(Some(self.stack_tags()))
                    .send()
                    .await;

                if let Err(error) = result {
                    let error = classify(error);
                    if !is_up_to_date(&error) {
                        return Err(error);
                    }

                    // Nothing was started, so the current status may be an
                    // earlier rollback that says nothing about this run.
                    tracing::info!(stack = %stack.name, "stack is up to date");
                    let outputs = self.get_outputs(&stack.name).await?;
                    return Ok((stack.name.clone(), outputs_to_map(&outputs)));
                }
            }
        }

        self.wait(&stack.name).await?;
        let outputs = self.get_outputs(&stack.name).await?;

        return Ok((stack.name.clone(), outputs_to_map(&outputs)));
    }

    async fn destroy_stack(&self, stack_name: &str) -> Result<(), Error> {
        match self.stack_status(stack_name).await {
            Err(Error::NotFoundError(_)) => {
                tracing::info!(stack = stack_name, "stack already gone");
                return Ok(());
            }
            Err(error) => return Err(error),
            Ok(_) => {}
        }

        tracing::info!(stack = stack_name, "deleting stack");
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(classify)?;

        match self.wait(stack_name).await {
            Err(Error::NotFoundError(_)) => Ok(()),
            other => other,
        }
    }

    async fn wait(&self, stack_name: &str) -> Result<(), Error> {
        for _ in 0..MAX_POLLS {
            let status = self.stack_status(stack_name).await?;
            match phase(&status) {
                StackPhase::InProgress => {
                    tracing::debug!(stack = stack_name, status = %status, "waiting");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                StackPhase::Succeeded => {
                    tracing::info!(stack = stack_name, status = %status, "stack settled");
                    return Ok(());
                }
                StackPhase::Failed => {
                    tracing::error!(stack = stack_name, status = %status, "stack failed");
                    return Err(Error::StackFailed {
                        stack: stack_name.to_string(),
                        status,
                    });
                }
            }
        }

        return Err(Error::Timeout(stack_name.to_string()));
    }

    async fn describe(
        &self,
        stack_name: &str,
    ) -> Result<aws_sdk_cloudformation::model::Stack, Error> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(error) => {
                return Err(match classify(error) {
                    Error::ServiceError(message) if message.contains("does not exist") => {
                        Error::NotFoundError(stack_name.to_string())
                    }
                    error => error,
                })
            }
        };

        let stacks = result.stacks().unwrap_or_else(|| &[]);
        match stacks.first() {
            Some(stack) => Ok(stack.clone()),
            None => Err(Error::NotFoundError(stack_name.to_string())),
        }
    }

    async fn stack_status(&self, stack_name: &str) -> Result<String, Error> {
        let stack = self.describe(stack_name).await?;
        match stack.stack_status() {
            Some(status) => Ok(status.as_str().to_string()),
            None => Err(Error::UnknownError(format!(
                "Stack {} reported no status",
                stack_name
            ))),
        }
    }

    pub async fn get_outputs(&self, stack_name: &str) -> Result<Vec<Output>, Error> {
        let stack = self.describe(stack_name).await?;
        let outputs = stack.outputs().unwrap_or_else(|| &[]).to_vec();

        return Ok(outputs);
    }

    fn stack_tags(&self) -> Vec<Tag> {
        self.tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect()
    }
}

fn classify<E>(error: SdkError<E>) -> Error
where
    E: std::error::Error + 'static,
{
    match error {
        SdkError::ServiceError { err, .. } => Error::ServiceError(err.to_string()),
        err => Error::UnknownError(err.to_string()),
    }
}

/// CloudFormation refuses an update whose template and tags are unchanged.
fn is_up_to_date(error: &Error) -> bool {
    match error {
        Error::ServiceError(message) => message.contains("No updates are to be performed"),
        _ => false,
    }
}

fn outputs_to_map(outputs: &[Output]) -> BTreeMap<String, String> {
    outputs
        .iter()
        .filter_map(|output| match (output.output_key(), output.output_value()) {
            (Some(key), Some(value)) => Some((key.to_string(), value.to_string())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use aws_sdk_cloudformation::model::Output;

    use super::{is_up_to_date, outputs_to_map, phase, Error, StackPhase};

    #[test]
    fn classifies_stack_statuses() {
        assert_eq!(StackPhase::InProgress, phase("CREATE_IN_PROGRESS"));
        assert_eq!(StackPhase::InProgress, phase("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"));
        assert_eq!(StackPhase::InProgress, phase("ROLLBACK_IN_PROGRESS"));
        assert_eq!(StackPhase::Succeeded, phase("CREATE_COMPLETE"));
        assert_eq!(StackPhase::Succeeded, phase("UPDATE_COMPLETE"));
        assert_eq!(StackPhase::Succeeded, phase("DELETE_COMPLETE"));
        assert_eq!(StackPhase::Failed, phase("ROLLBACK_COMPLETE"));
        assert_eq!(StackPhase::Failed, phase("UPDATE_ROLLBACK_COMPLETE"));
        assert_eq!(StackPhase::Failed, phase("CREATE_FAILED"));
        assert_eq!(StackPhase::Failed, phase("DELETE_FAILED"));
    }

    #[test]
    fn skips_outputs_without_values() {
        let outputs = vec![
            Output::builder()
                .output_key("VpcId")
                .output_value("vpc-123")
                .build(),
            Output::builder().output_key("Dangling").build(),
        ];

        let map = outputs_to_map(&outputs);
        assert_eq!(1, map.len());
        assert_eq!(Some(&String::from("vpc-123")), map.get("VpcId"));
    }

    #[test]
    fn unchanged_update_is_recognised() {
        assert_eq!(
            true,
            is_up_to_date(&Error::ServiceError(String::from(
                "ValidationError: No updates are to be performed."
            )))
        );
        assert_eq!(
            false,
            is_up_to_date(&Error::ServiceError(String::from(
                "ValidationError: Stack is in UPDATE_IN_PROGRESS state"
            )))
        );
        assert_eq!(
            false,
            is_up_to_date(&Error::UnknownError(String::from(
                "No updates are to be performed."
            )))
        );
    }
}
