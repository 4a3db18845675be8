//! Session lifecycle requests: initialize, launch, attach, configurationDone, disconnect

use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Error, Result};
use crate::dap::{AttachArguments, Capabilities, DisconnectArguments, LaunchArguments, Request};
use crate::engine::DebugEngine;
use crate::session::Session;

use super::RequestHandler;

pub struct Initialize;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Initialize {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let capabilities = Capabilities {
            supports_configuration_done_request: true,
            supports_evaluate_for_hovers: true,
            supports_instruction_breakpoints: true,
            supports_progress_reporting: true,
            supports_exception_filter_options: true,
            exception_breakpoint_filters: session
                .exception_breakpoints()
                .filters(session.engine()),
        };

        session
            .send_response(request, Some(serde_json::to_value(capabilities)?))
            .await?;
        session.send_event("initialized", None).await
    }
}

pub struct Launch;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Launch {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: LaunchArguments = request.parse_arguments()?;

        // Per-launch command lists replace the configured ones
        let commands = session.commands_mut();
        for (batch, requested) in [
            (&mut commands.init, &args.init_commands),
            (&mut commands.pre_run, &args.pre_run_commands),
            (&mut commands.stop, &args.stop_commands),
            (&mut commands.exit, &args.exit_commands),
            (&mut commands.terminate, &args.terminate_commands),
        ] {
            if !requested.is_empty() {
                batch.clone_from(requested);
            }
        }

        if let Some(format) = &args.custom_frame_format {
            session.set_frame_format(format).await?;
        }
        if let Some(format) = &args.custom_thread_format {
            session.set_thread_format(format).await?;
        }

        session.run_init_commands().await?;
        session.create_target(
            &args.program,
            args.target_triple.as_deref(),
            args.platform_name.as_deref(),
        )?;
        session.run_pre_run_commands().await?;

        let timeout = Duration::from_secs(
            args.timeout
                .unwrap_or(session.config().timeouts.process_stop_secs),
        );

        if args.launch_commands.is_empty() {
            session.engine().launch(args.stop_on_entry)?;
            if args.stop_on_entry {
                session.wait_for_process_to_stop(timeout).await?;
            }
        } else {
            session.run_launch_commands(&args.launch_commands).await?;
            session.wait_for_process_to_stop(timeout).await?;
        }

        tracing::info!(program = %args.program, "Launched debuggee");
        session.send_response(request, None).await?;

        if args.stop_on_entry {
            let thread = session.engine().threads().first().map(|t| t.id);
            if let Some(thread) = thread {
                session.handle_entry_stop(thread).await?;
            }
        }
        Ok(())
    }
}

pub struct Attach;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Attach {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: AttachArguments = request.parse_arguments()?;
        if args.pid.is_none() && args.attach_commands.is_empty() {
            return Err(Error::invalid_arguments(
                "attach needs either a pid or attachCommands",
            ));
        }

        let commands = session.commands_mut();
        for (batch, requested) in [
            (&mut commands.init, &args.init_commands),
            (&mut commands.pre_run, &args.pre_run_commands),
            (&mut commands.stop, &args.stop_commands),
            (&mut commands.exit, &args.exit_commands),
            (&mut commands.terminate, &args.terminate_commands),
        ] {
            if !requested.is_empty() {
                batch.clone_from(requested);
            }
        }

        session.run_init_commands().await?;
        if let Some(program) = &args.program {
            session.create_target(
                program,
                args.target_triple.as_deref(),
                args.platform_name.as_deref(),
            )?;
        }
        session.run_pre_run_commands().await?;

        match args.pid {
            Some(pid) if args.attach_commands.is_empty() => session.engine().attach(pid)?,
            _ => session.run_attach_commands(&args.attach_commands).await?,
        }

        let timeout = Duration::from_secs(
            args.timeout
                .unwrap_or(session.config().timeouts.process_stop_secs),
        );
        session.wait_for_process_to_stop(timeout).await?;

        tracing::info!(pid = ?args.pid, "Attached to debuggee");
        session.send_response(request, None).await
    }
}

pub struct ConfigurationDone;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for ConfigurationDone {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        session.set_configuration_done();
        session.send_response(request, None).await
    }
}

pub struct Disconnect;

#[async_trait]
impl<E: DebugEngine> RequestHandler<E> for Disconnect {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()> {
        let args: DisconnectArguments = request.parse_arguments()?;
        tracing::debug!(terminate_debuggee = ?args.terminate_debuggee, "Disconnecting");

        session.run_terminate_commands().await;
        session.set_disconnecting();
        session.send_response(request, None).await
    }
}
