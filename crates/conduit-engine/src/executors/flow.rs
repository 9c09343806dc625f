use std::sync::Arc;

use conduit_config::Action;
use conduit_context::FlowExecutorContext;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::handler_for;
use crate::constants::EngineConstants;
use crate::error::EngineError;
use crate::guard::check_cancelled;
use crate::services::EngineServices;

/// Walks an action chain, dispatching each action to its handler.
///
/// After every step the progress reporter is called, which also enforces
/// the run deadline. The walk stops at the end of the chain or as soon as
/// the verdict leaves RUNNING. Errors leave carrying the last context the
/// walk reached.
#[derive(Clone)]
pub struct FlowExecutor {
  services: Arc<EngineServices>,
}

impl FlowExecutor {
  pub fn new(services: Arc<EngineServices>) -> Self {
    Self { services }
  }

  pub fn services(&self) -> &EngineServices {
    &self.services
  }

  #[instrument(
    name = "flow_execute",
    skip_all,
    fields(flow_run_id = %constants.flow_run_id, first_step = %action.name())
  )]
  pub async fn execute(
    &self,
    action: &Action,
    ctx: FlowExecutorContext,
    constants: &EngineConstants,
  ) -> Result<FlowExecutorContext, EngineError> {
    self.execute_from_action(Some(action), ctx, constants).await
  }

  /// Run `action` and its successors. Child chains of control structures
  /// come back through here.
  pub fn execute_from_action<'a>(
    &'a self,
    action: Option<&'a Action>,
    ctx: FlowExecutorContext,
    constants: &'a EngineConstants,
  ) -> BoxFuture<'a, Result<FlowExecutorContext, EngineError>> {
    Box::pin(async move {
      let mut ctx = ctx;
      let mut current = action;

      while let Some(action) = current {
        if let Err(e) = check_cancelled(constants) {
          return Err(e.interrupted(ctx));
        }

        let started = Instant::now();
        let before = ctx.clone();
        ctx = match handler_for(action.action_type())
          .handle(self, action, ctx, constants)
          .await
        {
          Ok(ctx) => ctx,
          Err(e) => return Err(e.interrupted(before)),
        };
        debug!(
          step_name = %action.name(),
          step_type = ?action.action_type(),
          verdict = ?ctx.verdict(),
          duration_ms = started.elapsed().as_millis() as u64,
          "step_handled"
        );

        if let Err(e) = self.services.progress.send_update(constants, &ctx).await {
          return Err(e.interrupted(ctx));
        }

        if !ctx.is_running() || constants.single_step {
          break;
        }
        current = action.next_action();
      }

      Ok(ctx)
    })
  }
}
