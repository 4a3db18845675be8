//! Breakpoint requests

use async_trait::async_trait;
use serde_json::json;

use crate::common::Result;
use crate::dap::{
    Breakpoint, Request, SetExceptionBreakpointsArguments, SetInstructionBreakpointsArguments,
};
use crate::engine::DebugEngine;
use crate::session::Session;

use super::RequestHandler;

pub struct SetExceptionBreakpoints;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for SetExceptionBreakpoints {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: SetExceptionBreakpointsArguments = request.parse_arguments()?;
        let unknown = session
            .exception_breakpoints()
            .set_filters(session.engine(), &args.filters)?;

        let breakpoints: Vec<Breakpoint> = args
            .filters
            .iter()
            .map(|filter| {
                let known = !unknown.contains(filter);
                if !known {
                    tracing::warn!(filter = %filter, "Unknown exception filter");
                }
                Breakpoint {
                    id: None,
                    verified: known,
                    message: (!known).then(|| format!("unknown exception filter '{filter}'")),
                    instruction_reference: None,
                }
            })
            .collect();

        session
            .send_response(request, Some(json!({ "breakpoints": breakpoints })))
            .await
    }
}

pub struct SetInstructionBreakpoints;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for SetInstructionBreakpoints {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: SetInstructionBreakpointsArguments = request.parse_arguments()?;
        let engine = session.engine_handle();
        let breakpoints = session
            .instruction_breakpoints_mut()
            .set(engine.as_ref(), &args.breakpoints)?;

        session
            .send_response(request, Some(json!({ "breakpoints": breakpoints })))
            .await
    }
}
