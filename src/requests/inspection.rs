//! Inspection requests: threads, scopes, variables, evaluate

use async_trait::async_trait;
use serde_json::json;

use crate::common::Result;
use crate::console;
use crate::dap::{
    EvaluateArguments, EvaluateResponseBody, OutputCategory, Request, ScopesArguments, Thread,
    Variable, VariablesArguments,
};
use crate::engine::DebugEngine;
use crate::session::repl::ReplMode;
use crate::session::variables::VariableRegistry;
use crate::session::Session;

use super::RequestHandler;

pub struct Threads;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Threads {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let threads: Vec<Thread> = session
            .engine()
            .threads()
            .into_iter()
            .map(|thread| Thread {
                id: thread.id,
                name: thread.name,
            })
            .collect();

        session
            .send_response(request, Some(json!({ "threads": threads })))
            .await
    }
}

pub struct Scopes;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Scopes {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: ScopesArguments = request.parse_arguments()?;
        let scopes = session.engine().frame_scopes(args.frame_id);
        session.variables_mut().set_scopes(scopes);

        let scopes = session.create_top_level_scopes();
        session
            .send_response(request, Some(json!({ "scopes": scopes })))
            .await
    }
}

pub struct Variables;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Variables {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: VariablesArguments = request.parse_arguments()?;
        let reference = args.variables_reference;

        // Stale handles are normal after a stop: answer with no children
        let values: Vec<E::Value> = match session.variables().scope(reference) {
            Some(values) => values.to_vec(),
            None => session
                .variables()
                .resolve(reference)
                .map(|value| session.engine().children(value))
                .unwrap_or_default(),
        };

        // Children of a permanent value must outlive the next stop too
        let permanent = VariableRegistry::<E::Value>::is_permanent(reference);
        let variables: Vec<Variable> = values
            .into_iter()
            .map(|value| to_variable(session, value, permanent))
            .collect();

        session
            .send_response(request, Some(json!({ "variables": variables })))
            .await
    }
}

fn to_variable<E: DebugEngine>(session: &mut Session<E>, value: E::Value, permanent: bool) -> Variable {
    let summary = session.engine().summarize(&value);
    let variables_reference = if summary.has_children {
        session.variables_mut().insert(value, permanent)
    } else {
        0
    };
    Variable {
        name: summary.name,
        value: summary.value,
        type_name: summary.type_name,
        variables_reference,
    }
}

pub struct Evaluate;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Evaluate {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: EvaluateArguments = request.parse_arguments()?;
        let is_repl = args.context.as_deref() == Some("repl");
        let mut expression = args.expression;

        if is_repl {
            let detection = session.detect_repl_mode(args.frame_id, &expression, false);
            if let Some(warning) = &detection.warning {
                session.send_output(OutputCategory::Console, warning).await?;
            }

            if detection.mode == ReplMode::Command {
                let result = match console::run_console_command(session, &detection.expression).await {
                    Some(result) => result?,
                    None => session.engine().run_command(&detection.expression).output,
                };
                let body = EvaluateResponseBody {
                    result,
                    type_name: None,
                    variables_reference: 0,
                };
                return session
                    .send_response(request, Some(serde_json::to_value(body)?))
                    .await;
            }
            expression = detection.expression;
        }

        let value = session.engine().evaluate(args.frame_id, &expression)?;
        let summary = session.engine().summarize(&value);
        // Console results stay expandable after the program moves on
        let variables_reference = if summary.has_children {
            session.variables_mut().insert(value, is_repl)
        } else {
            0
        };

        let body = EvaluateResponseBody {
            result: summary.value,
            type_name: summary.type_name,
            variables_reference,
        };
        session
            .send_response(request, Some(serde_json::to_value(body)?))
            .await
    }
}
