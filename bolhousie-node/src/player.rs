//! Player role: one `PlayerClient` towards the host, a local board, and stdin commands.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Context;
use bolhousie_core::{
    generate_ticket, Catalog, ClaimKind, ConnectionId, PeerId, PlayerAction, PlayerBoard,
    PlayerClient, Session,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::{ChannelEvent, PeerChannel};
use crate::config::Config;

const HELP: &str = "commands: ticket | mark <cell> | claim <type> | rules | state | retry | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlayerCommand {
    Ticket,
    /// 1-based cell number or item id.
    Mark(String),
    Claim(ClaimKind),
    Rules,
    State,
    Retry,
    Help,
    Quit,
}

impl FromStr for PlayerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (word, rest) = s.split_once(' ').unwrap_or((s, ""));
        let rest = rest.trim();
        match word.to_ascii_lowercase().as_str() {
            "ticket" | "t" => Ok(Self::Ticket),
            "mark" | "m" if !rest.is_empty() => Ok(Self::Mark(rest.to_string())),
            "claim" | "c" => rest
                .parse::<ClaimKind>()
                .map(Self::Claim)
                .map_err(|e| format!("{e}; one of Teaser, Prime Time, Intermission, Late Night, Jackpot")),
            "rules" => Ok(Self::Rules),
            "state" | "s" => Ok(Self::State),
            "retry" | "r" => Ok(Self::Retry),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!("unknown command {other:?}")),
        }
    }
}

/// Connection plumbing around the client: timers and the channel handle.
struct Driver {
    channel: PeerChannel,
    timers: HashMap<ConnectionId, JoinHandle<()>>,
    timeout_tx: mpsc::UnboundedSender<ConnectionId>,
}

impl Driver {
    fn perform(&mut self, actions: Vec<PlayerAction>) {
        for action in actions {
            match action {
                PlayerAction::Connect {
                    conn,
                    host,
                    metadata,
                } => self.channel.connect(conn, host, metadata),
                PlayerAction::StartTimeout { conn, after } => {
                    let tx = self.timeout_tx.clone();
                    let fired = conn.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(fired);
                    });
                    if let Some(old) = self.timers.insert(conn, timer) {
                        old.abort();
                    }
                }
                PlayerAction::CancelTimeout { conn } => {
                    if let Some(timer) = self.timers.remove(&conn) {
                        timer.abort();
                    }
                }
                PlayerAction::Send { conn, bytes } => self.channel.send(conn, bytes),
                PlayerAction::Close { conn } => self.channel.close(conn),
            }
        }
    }
}

/// A claim sent to the host and not yet seen in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SentClaim {
    kind: ClaimKind,
    /// Our claims in the last snapshot when it was sent.
    seen: usize,
}

struct Player {
    host_id: PeerId,
    name: String,
    client: PlayerClient,
    board: PlayerBoard,
    endpoint_ready: bool,
    /// Our identity on the relay; the host files our claims under it.
    my_id: Option<PeerId>,
    last_tagline: Option<String>,
    sent_claim: Option<SentClaim>,
}

/// Claim patterns, one per line.
fn rules() -> String {
    ClaimKind::ALL
        .iter()
        .map(|kind| format!("  {:<13} {}", kind.as_str(), kind.rule()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Status lines for a snapshot.
fn describe(state: &Session) -> Vec<String> {
    let mut lines = vec![format!(
        "{:?}: {} called, {} players, {} claims",
        state.status,
        state.history.len(),
        state.players.len(),
        state.claims.len()
    )];
    lines.push(format!(
        "Now calling: {}",
        state.current_tagline.as_deref().unwrap_or("-")
    ));
    if let Some(prev) = state.history.len().checked_sub(2).map(|i| &state.history[i]) {
        lines.push(format!("Last brand: \"{}\"", prev.item.name));
    }
    lines
}

impl Player {
    fn connect(&mut self) -> Vec<PlayerAction> {
        match self
            .client
            .connect_to_host(self.endpoint_ready, self.host_id.clone(), &self.name)
        {
            Ok(actions) => {
                println!("Connecting to game {} ...", self.host_id);
                actions
            }
            Err(e) => {
                println!("Cannot connect: {e}");
                Vec::new()
            }
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent, auto_connect: &mut bool) -> Vec<PlayerAction> {
        match event {
            ChannelEvent::Status { status, ready } => {
                tracing::info!(status = status.as_str(), ready, "endpoint status");
                self.endpoint_ready = ready;
                Vec::new()
            }
            ChannelEvent::Open(id) => {
                tracing::debug!(%id, "endpoint open");
                self.my_id = Some(id);
                if std::mem::take(auto_connect) {
                    return self.connect();
                }
                Vec::new()
            }
            ChannelEvent::Incoming { conn, from, .. } => {
                tracing::warn!(%conn, %from, "players do not take connections, closing");
                vec![PlayerAction::Close { conn }]
            }
            ChannelEvent::ConnectionOpened(conn) => {
                let actions = self.client.on_open(&conn);
                if self.client.is_connected() {
                    println!("Connected as {}", self.name);
                }
                actions
            }
            ChannelEvent::Data { conn, payload } => {
                self.client.on_data(&conn, &payload);
                self.show_updates();
                Vec::new()
            }
            ChannelEvent::ConnectionClosed(conn) => {
                self.drop_sent_claim(&conn);
                self.report(|c| c.on_close(&conn))
            }
            ChannelEvent::ConnectionFailed { conn, message } => {
                self.drop_sent_claim(&conn);
                self.report(|c| c.on_error(&conn, Some(message.as_str())))
            }
        }
    }

    fn on_timeout(&mut self, conn: &ConnectionId) -> Vec<PlayerAction> {
        self.report(|c| c.on_timeout(conn))
    }

    /// Run a client transition and print the error it leaves behind, if new.
    fn report(&mut self, f: impl FnOnce(&mut PlayerClient) -> Vec<PlayerAction>) -> Vec<PlayerAction> {
        let before = self.client.error().map(str::to_string);
        let actions = f(&mut self.client);
        if let Some(err) = self.client.error() {
            if before.as_deref() != Some(err) {
                println!("{err}. Type 'retry' to try again.");
            }
        }
        actions
    }

    /// The link carrying an unconfirmed claim went away; the host may never have seen it.
    fn drop_sent_claim(&mut self, conn: &ConnectionId) {
        if self.client.connection() != Some(conn) {
            return;
        }
        if let Some(sent) = self.sent_claim.take() {
            println!("{} claim was not confirmed by the host", sent.kind);
        }
    }

    /// Claims the host has filed under our identity.
    fn my_claims(&self) -> usize {
        match (self.client.game_state(), &self.my_id) {
            (Some(state), Some(me)) => state.claims.iter().filter(|c| &c.player_id == me).count(),
            _ => 0,
        }
    }

    fn show_updates(&mut self) {
        let Some(state) = self.client.game_state() else {
            return;
        };
        if state.current_tagline != self.last_tagline {
            if let Some(tagline) = &state.current_tagline {
                println!("Now calling: \"{tagline}\"");
            }
            self.last_tagline = state.current_tagline.clone();
        }
        if let Some(sent) = self.sent_claim {
            if self.my_claims() > sent.seen {
                println!("Claimed {}!", sent.kind);
                self.sent_claim = None;
            }
        }
    }

    fn on_command(&mut self, cmd: PlayerCommand) -> Vec<PlayerAction> {
        match cmd {
            PlayerCommand::Ticket => {
                self.print_ticket();
                Vec::new()
            }
            PlayerCommand::Mark(cell) => {
                let id = match cell.parse::<usize>() {
                    Ok(n) if n >= 1 => self.board.ticket().cells().nth(n - 1).map(|i| i.id.clone()),
                    _ => Some(cell),
                };
                match id.and_then(|id| self.board.toggle(&id).map(|on| (id, on))) {
                    Some((id, true)) => println!("Marked {id}"),
                    Some((id, false)) => println!("Unmarked {id}"),
                    None => println!("That cell is not on your ticket"),
                }
                Vec::new()
            }
            PlayerCommand::Claim(kind) => match self.board.claim(kind, &self.name) {
                Ok(payload) => {
                    let seen = self.my_claims();
                    let actions = self.client.send_claim(payload);
                    if actions.is_empty() {
                        println!("Not connected to the host");
                    } else {
                        println!("{kind} claim sent, waiting for the host");
                        self.sent_claim = Some(SentClaim { kind, seen });
                    }
                    actions
                }
                Err(rejected) => {
                    println!("{rejected}");
                    Vec::new()
                }
            },
            PlayerCommand::Rules => {
                println!("{}", rules());
                Vec::new()
            }
            PlayerCommand::State => {
                match self.client.game_state() {
                    Some(state) => {
                        for line in describe(state) {
                            println!("{line}");
                        }
                    }
                    None => println!("No game state yet ({:?})", self.client.state()),
                }
                Vec::new()
            }
            PlayerCommand::Retry if self.client.is_connecting() => {
                println!("Still connecting to game {}", self.host_id);
                Vec::new()
            }
            PlayerCommand::Retry => self.connect(),
            PlayerCommand::Help | PlayerCommand::Quit => {
                println!("{HELP}");
                Vec::new()
            }
        }
    }

    fn print_ticket(&self) {
        let mut n = 0;
        for row in self.board.ticket().rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|item| {
                    n += 1;
                    let mark = if self.board.is_marked(&item.id) { "x" } else { " " };
                    format!("{n:>2}[{mark}] {}", item.name)
                })
                .collect();
            println!("{}", cells.join(" | "));
        }
    }
}

pub async fn run(cfg: &Config, catalog: Catalog, host_id: PeerId, name: String) -> anyhow::Result<()> {
    let ticket = generate_ticket(&catalog, &mut rand::thread_rng()).context("generating ticket")?;
    let (channel, mut events) = PeerChannel::spawn(cfg.peer_addr(), cfg.peer_secure);
    let (timeout_tx, mut timeouts) = mpsc::unbounded_channel();
    let mut driver = Driver {
        channel,
        timers: HashMap::new(),
        timeout_tx,
    };
    let mut player = Player {
        host_id,
        name,
        client: PlayerClient::new(),
        board: PlayerBoard::new(ticket),
        endpoint_ready: false,
        my_id: None,
        last_tagline: None,
        sent_claim: None,
    };
    let mut auto_connect = true;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    player.print_ticket();
    println!("{HELP}");

    loop {
        let actions = tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                player.on_channel_event(event, &mut auto_connect)
            }
            Some(conn) = timeouts.recv() => {
                driver.timers.remove(&conn);
                player.on_timeout(&conn)
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                match line.parse::<PlayerCommand>() {
                    Ok(PlayerCommand::Quit) => break,
                    Ok(cmd) => player.on_command(cmd),
                    Err(e) => {
                        println!("{e}");
                        Vec::new()
                    }
                }
            }
        };
        driver.perform(actions);
    }
    for (_, timer) in driver.timers.drain() {
        timer.abort();
    }
    tracing::info!("player stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolhousie_core::{AudioIndex, EndpointStatus, HostEvent, HostSession, OutboundAction};

    #[test]
    fn parse_commands() {
        assert_eq!("ticket".parse::<PlayerCommand>(), Ok(PlayerCommand::Ticket));
        assert_eq!("mark 7".parse::<PlayerCommand>(), Ok(PlayerCommand::Mark("7".into())));
        assert_eq!(
            "claim prime time".parse::<PlayerCommand>(),
            Ok(PlayerCommand::Claim(ClaimKind::PrimeTime))
        );
        assert_eq!(
            "c LATE_NIGHT".parse::<PlayerCommand>(),
            Ok(PlayerCommand::Claim(ClaimKind::LateNight))
        );
        assert!("claim bingo".parse::<PlayerCommand>().is_err());
        assert!("mark".parse::<PlayerCommand>().is_err());
    }

    fn player() -> Player {
        let catalog = Catalog::from_json(include_str!("../data/brands.json")).unwrap();
        let ticket = generate_ticket(&catalog, &mut rand::thread_rng()).unwrap();
        Player {
            host_id: PeerId::from("host"),
            name: "Asha".into(),
            client: PlayerClient::new(),
            board: PlayerBoard::new(ticket),
            endpoint_ready: false,
            my_id: None,
            last_tagline: None,
            sent_claim: None,
        }
    }

    fn ready(ready: bool) -> ChannelEvent {
        ChannelEvent::Status {
            status: if ready {
                EndpointStatus::Connected
            } else {
                EndpointStatus::Disconnected
            },
            ready,
        }
    }

    #[test]
    fn connects_once_when_endpoint_opens() {
        let mut p = player();
        let mut auto = true;
        p.on_channel_event(ready(true), &mut auto);
        let actions = p.on_channel_event(ChannelEvent::Open(PeerId::from("me")), &mut auto);
        assert!(matches!(actions[0], PlayerAction::Connect { .. }));
        assert!(!auto);
        // A later reconnect of the endpoint does not start a second attempt.
        let again = p.on_channel_event(ChannelEvent::Open(PeerId::from("me")), &mut auto);
        assert!(again.is_empty());
    }

    #[test]
    fn readiness_follows_endpoint_status() {
        let mut p = player();
        let mut auto = false;
        p.on_channel_event(ready(true), &mut auto);
        assert!(p.endpoint_ready);
        p.on_channel_event(ready(false), &mut auto);
        assert!(!p.endpoint_ready);
        // Open alone does not make the endpoint ready.
        p.on_channel_event(ChannelEvent::Open(PeerId::from("me")), &mut auto);
        assert!(!p.endpoint_ready);
        assert!(p.on_command(PlayerCommand::Retry).is_empty());
    }

    /// Feed the player's sends into the host; returns what the host sends back.
    fn to_host(host: &mut HostSession, actions: Vec<PlayerAction>) -> Vec<OutboundAction> {
        let mut out = Vec::new();
        for action in actions {
            if let PlayerAction::Send { conn, bytes } = action {
                out.extend(host.apply(HostEvent::MessageReceived { conn, bytes }));
            }
        }
        out
    }

    fn to_player(p: &mut Player, actions: Vec<OutboundAction>) {
        for OutboundAction::Send(conn, payload) in actions {
            p.on_channel_event(ChannelEvent::Data { conn, payload }, &mut false);
        }
    }

    /// A player joined to a host over connection `conn`, with five cells marked.
    fn joined() -> (Player, HostSession, ConnectionId) {
        let mut p = player();
        let mut auto = true;
        p.on_channel_event(ready(true), &mut auto);
        let actions = p.on_channel_event(ChannelEvent::Open(PeerId::from("me")), &mut auto);
        let conn = match &actions[0] {
            PlayerAction::Connect { conn, .. } => conn.clone(),
            other => panic!("expected connect, got {other:?}"),
        };
        let catalog = Catalog::from_json(include_str!("../data/brands.json")).unwrap();
        let mut host = HostSession::with_seed(catalog, 3);
        host.apply(HostEvent::ConnectionAccepted {
            conn: conn.clone(),
            peer: PeerId::from("me"),
        });
        let mut replies = host.apply(HostEvent::ConnectionOpened(conn.clone()));
        let join = p.on_channel_event(ChannelEvent::ConnectionOpened(conn.clone()), &mut auto);
        replies.extend(to_host(&mut host, join));
        to_player(&mut p, replies);
        for cell in 1..=5 {
            p.on_command(PlayerCommand::Mark(cell.to_string()));
        }
        (p, host, conn)
    }

    #[test]
    fn claim_is_confirmed_once_the_host_files_it() {
        let (mut p, mut host, _conn) = joined();
        let sent = p.on_command(PlayerCommand::Claim(ClaimKind::Teaser));
        assert!(matches!(sent[0], PlayerAction::Send { .. }));
        assert_eq!(
            p.sent_claim,
            Some(SentClaim {
                kind: ClaimKind::Teaser,
                seen: 0
            })
        );
        let replies = to_host(&mut host, sent);
        to_player(&mut p, replies);
        assert_eq!(p.sent_claim, None);
        assert_eq!(p.my_claims(), 1);
    }

    #[test]
    fn claim_lost_with_the_connection_is_not_confirmed() {
        let (mut p, _host, conn) = joined();
        p.on_command(PlayerCommand::Claim(ClaimKind::Teaser));
        assert!(p.sent_claim.is_some());
        p.on_channel_event(ChannelEvent::ConnectionClosed(conn), &mut false);
        assert_eq!(p.sent_claim, None);
        assert!(!p.client.is_connected());
    }

    #[test]
    fn rules_list_every_claim() {
        let text = rules();
        assert_eq!(text.lines().count(), ClaimKind::ALL.len());
        assert!(text.contains("Prime Time"));
        assert!(text.contains("Full house - all 15!"));
        assert_eq!("rules".parse::<PlayerCommand>(), Ok(PlayerCommand::Rules));
    }

    #[test]
    fn state_shows_the_brand_before_the_current_call() {
        let (mut p, mut host, _conn) = joined();
        to_player(&mut p, host.apply(HostEvent::StartGame { audio: AudioIndex::new() }));
        let state = p.client.game_state().unwrap();
        assert!(!describe(state).iter().any(|l| l.starts_with("Last brand")));

        to_player(&mut p, host.call_next().unwrap());
        let state = p.client.game_state().unwrap();
        assert!(!describe(state).iter().any(|l| l.starts_with("Last brand")));

        to_player(&mut p, host.call_next().unwrap());
        let state = p.client.game_state().unwrap();
        let first = &state.history[0].item.name;
        assert!(describe(state).contains(&format!("Last brand: \"{first}\"")));
    }

    #[test]
    fn invalid_claim_is_not_sent() {
        let mut p = player();
        let actions = p.on_command(PlayerCommand::Claim(ClaimKind::Jackpot));
        assert!(actions.is_empty());
    }

    #[test]
    fn mark_by_cell_number() {
        let mut p = player();
        let first = p.board.ticket().rows()[0][0].id.clone();
        let sixth = p.board.ticket().rows()[1][0].id.clone();
        p.on_command(PlayerCommand::Mark("1".into()));
        p.on_command(PlayerCommand::Mark("6".into()));
        assert!(p.board.is_marked(&first));
        assert!(p.board.is_marked(&sixth));
        p.on_command(PlayerCommand::Mark(first.clone()));
        assert!(!p.board.is_marked(&first));
        p.on_command(PlayerCommand::Mark("99".into()));
        assert_eq!(p.board.marked().len(), 1);
    }
}
