//! Host role: drives a `HostSession` from channel events and operator commands on stdin.

use std::str::FromStr;

use anyhow::Context;
use bolhousie_core::{
    AudioIndex, CallerError, Catalog, HostEvent, HostSession, OutboundAction, SessionStatus,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::audio;
use crate::channel::{ChannelEvent, PeerChannel};
use crate::config::Config;

const HELP: &str = "commands: start | next | players | claims | status | reload | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCommand {
    Start,
    Next,
    Players,
    Claims,
    Status,
    Reload,
    Help,
    Quit,
}

impl FromStr for HostCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "next" | "n" | "" => Ok(Self::Next),
            "players" => Ok(Self::Players),
            "claims" => Ok(Self::Claims),
            "status" => Ok(Self::Status),
            "reload" => Ok(Self::Reload),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!("unknown command {other:?}")),
        }
    }
}

/// What to do once the audio lookup finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterAudio {
    Start,
    Reload,
}

/// Audio lookups run as tasks so the session keeps serving players meanwhile.
struct AudioLoader {
    base_url: Option<String>,
    pending: Option<AfterAudio>,
    done: mpsc::UnboundedSender<(AfterAudio, AudioIndex)>,
}

impl AudioLoader {
    fn new(base_url: Option<String>) -> (Self, mpsc::UnboundedReceiver<(AfterAudio, AudioIndex)>) {
        let (done, results) = mpsc::unbounded_channel();
        let loader = Self {
            base_url,
            pending: None,
            done,
        };
        (loader, results)
    }

    /// Start a lookup unless one is already running.
    fn begin(&mut self, then: AfterAudio, catalog: &Catalog) {
        if self.pending.is_some() {
            println!("Still loading...");
            return;
        }
        println!("Loading...");
        self.pending = Some(then);
        let done = self.done.clone();
        let base_url = self.base_url.clone();
        let catalog = catalog.clone();
        tokio::spawn(async move {
            let audio = audio::probe(base_url.as_deref(), &catalog).await;
            let _ = done.send((then, audio));
        });
    }
}

pub async fn run(cfg: &Config, catalog: Catalog) -> anyhow::Result<()> {
    let (channel, mut events) = PeerChannel::spawn(cfg.peer_addr(), cfg.peer_secure);
    let mut host = HostSession::new(catalog);
    let (mut loader, mut loaded) = AudioLoader::new(cfg.audio_base_url.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let actions = on_channel_event(&mut host, event);
                perform(&channel, actions);
            }
            Some((then, audio)) = loaded.recv() => {
                let actions = on_audio_loaded(&mut host, &mut loader, then, audio);
                perform(&channel, actions);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                let cmd = match line.parse::<HostCommand>() {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        println!("{e}; {HELP}");
                        continue;
                    }
                };
                if cmd == HostCommand::Quit {
                    break;
                }
                let actions = on_command(&mut host, &mut loader, cmd);
                perform(&channel, actions);
            }
        }
    }
    tracing::info!("host stopped");
    Ok(())
}

fn perform(channel: &PeerChannel, actions: Vec<OutboundAction>) {
    for OutboundAction::Send(conn, bytes) in actions {
        channel.send(conn, bytes);
    }
}

fn on_channel_event(host: &mut HostSession, event: ChannelEvent) -> Vec<OutboundAction> {
    match event {
        ChannelEvent::Open(id) => {
            println!("Game ID: {id}  (players join with: bolhousie play --host-id {id} --name <name>)");
            Vec::new()
        }
        ChannelEvent::Status { status, ready } => {
            tracing::info!(status = status.as_str(), ready, "endpoint status");
            Vec::new()
        }
        ChannelEvent::Incoming { conn, from, metadata } => {
            tracing::info!(%conn, %from, name = ?metadata.player_name, "player connecting");
            host.apply(HostEvent::ConnectionAccepted { conn, peer: from })
        }
        ChannelEvent::ConnectionOpened(conn) => host.apply(HostEvent::ConnectionOpened(conn)),
        ChannelEvent::Data { conn, payload } => host.apply(HostEvent::MessageReceived {
            conn,
            bytes: payload,
        }),
        ChannelEvent::ConnectionClosed(conn) => host.apply(HostEvent::ConnectionClosed(conn)),
        ChannelEvent::ConnectionFailed { conn, message } => {
            tracing::debug!(%conn, %message, "connection failed");
            Vec::new()
        }
    }
}

fn on_audio_loaded(
    host: &mut HostSession,
    loader: &mut AudioLoader,
    then: AfterAudio,
    audio: AudioIndex,
) -> Vec<OutboundAction> {
    loader.pending = None;
    match then {
        AfterAudio::Start => {
            let actions = host.apply(HostEvent::StartGame { audio });
            println!("Game started, {} items to call", host.remaining_calls());
            actions
        }
        AfterAudio::Reload => {
            host.reload_caller(&audio);
            println!("Caller reloaded, {} items to call", host.remaining_calls());
            Vec::new()
        }
    }
}

fn on_command(host: &mut HostSession, loader: &mut AudioLoader, cmd: HostCommand) -> Vec<OutboundAction> {
    match cmd {
        HostCommand::Start => {
            loader.begin(AfterAudio::Start, host.catalog());
            Vec::new()
        }
        HostCommand::Next if host.session().status == SessionStatus::Lobby => {
            println!("Start the game first");
            Vec::new()
        }
        HostCommand::Next => match host.call_next() {
            Ok(actions) => {
                if let Some(call) = host.session().last_call() {
                    println!("{:>3}. {}  ({})", host.session().history.len(), call.tagline, call.item.name);
                }
                actions
            }
            Err(CallerError::Exhausted) => {
                println!("Show Over! Every item has been called.");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(error = %e, "call failed");
                Vec::new()
            }
        },
        HostCommand::Players => {
            let players = &host.session().players;
            if players.is_empty() {
                println!("No players yet");
            }
            for p in players {
                println!("  {} ({})", p.name, p.id);
            }
            Vec::new()
        }
        HostCommand::Claims => {
            let claims = &host.session().claims;
            if claims.is_empty() {
                println!("No claims yet");
            }
            for c in claims {
                println!("  {} claims {} [{:?}]", c.player, c.kind, c.status);
            }
            Vec::new()
        }
        HostCommand::Status => {
            let s = host.session();
            println!(
                "{:?}: {} called, {} left, {} players, {} open connections",
                s.status,
                s.history.len(),
                host.remaining_calls(),
                s.players.len(),
                host.open_connections().count()
            );
            Vec::new()
        }
        HostCommand::Reload => {
            loader.begin(AfterAudio::Reload, host.catalog());
            Vec::new()
        }
        HostCommand::Help | HostCommand::Quit => {
            println!("{HELP}");
            Vec::new()
        }
    }
}
