//! The sequential engine (`spec.md` §4.5).

use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::model::{DoTask, FlowDirective, TaskNode};
use crate::registry::{BuilderRegistry, TaskOutcome};
use crate::runtime_ctx::{ContinueAsNewCarrier, RuntimeCtx};
use crate::state::State;
use crate::value::Value;

pub async fn execute(
    registry: &BuilderRegistry,
    task: &DoTask,
    _node: &TaskNode,
    ctx: &dyn RuntimeCtx,
    _input: Value,
    state: &mut State,
) -> Result<TaskOutcome, EngineError> {
    let mut next_target: Option<String> = None;
    let mut last_output = Value::Null;

    for child in &task.tasks {
        // Step 1: continue-as-new trigger.
        if ctx.continue_as_new_suggested() || ctx.history_length() > registry.history_length_override
        {
            let carrier = ContinueAsNewCarrier {
                start_from: child.id.clone(),
                initial_data: state.data.clone(),
                initial_context: state.context.clone(),
            };
            debug!(task = %child.base.name, "continue-as-new triggered");
            return Ok(TaskOutcome::ContinueAsNew(carrier));
        }

        // Step 2: resume-cursor skip.
        if let Some(cursor) = state.can_start_from.clone() {
            if cursor != child.id {
                if !registry.never_skip_can(child) {
                    continue;
                }
            } else {
                state.can_start_from = None;
            }
        }

        // Step 3: named-jump skip.
        if let Some(target) = next_target.clone() {
            if child.base.name != target {
                continue;
            }
            next_target = None;
        }

        // Step 4: ShouldRun.
        if !registry.should_run(child, state)? {
            continue;
        }

        // Step 5: input schema validation.
        registry.validate_input(child, &state.input)?;

        // Steps 6-7: ParseMetadata / activity-option glue. The evaluated
        // metadata map is forwarded to leaf builders through
        // `ActivityRequest::search_attributes`; composite builders ignore it.
        let _metadata = registry.parse_metadata(child, state)?;

        // Step 8: invoke.
        let outcome = registry
            .execute(child, ctx, state.input.clone(), state)
            .await?;

        match outcome {
            TaskOutcome::ContinueAsNew(carrier) => return Ok(TaskOutcome::ContinueAsNew(carrier)),
            TaskOutcome::Skipped => continue,
            TaskOutcome::Completed(raw) => {
                // Steps 9: processTaskOutput then processTaskExport.
                let processed = registry.process_task_output(child, &raw, state)?;
                state.output = Some(processed.clone());
                state.record_task_data(&child.base.name, processed.clone());
                if let Some(exported) = registry.process_task_export(child, &processed, state)? {
                    state.record_task_export(&child.base.name, exported);
                }

                // Step 10: claim-check offload.
                registry.claim_check.maybe_offload(&mut state.data);

                last_output = processed;

                // Step 11: interpret `then` (switch may have overridden it).
                let directive = state
                    .pending_flow
                    .take()
                    .unwrap_or_else(|| registry.then_directive(child));
                match directive {
                    FlowDirective::Continue => {}
                    FlowDirective::End => return Ok(TaskOutcome::Completed(last_output)),
                    FlowDirective::Jump(target) => next_target = Some(target),
                }
            }
        }
    }

    if let Some(target) = next_target {
        warn!(target = %target, "do sequencer ended without reaching jump target");
        return Err(EngineError::Flow(target));
    }

    Ok(TaskOutcome::Completed(last_output))
}
