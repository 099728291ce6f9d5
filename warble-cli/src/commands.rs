use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use func::{EventOutcome, FuncClient, Function, message::AbsenceKind};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{io::AsyncWriteExt, select, time::MissedTickBehavior};
use tracing::{debug, info, warn};
use warble::{
    Payload, Timestamp, WarbleRecord,
    api::{
        FollowReply, FollowRequest, ProfileReply, ProfileRequest, ReadReply, ReadRequest,
        RegisterUserReply, RegisterUserRequest, StreamReply, StreamRequest, WarbleReply,
        WarbleRequest,
    },
};

use crate::cli::{
    Cli, Command, FollowArgs, HookArgs, ProfileArgs, ReadArgs, RegisterArgs, StreamArgs,
    UnhookArgs, WarbleArgs,
};

pub async fn run(cli: Cli) -> Result<()> {
    let client = FuncClient::new(cli.server);
    match cli.command {
        Command::Hook(args) => hook(&client, args).await,
        Command::Unhook(args) => unhook(&client, args).await,
        Command::Register(args) => register(&client, args).await,
        Command::Warble(args) => post(&client, args).await,
        Command::Follow(args) => follow(&client, args).await,
        Command::Read(args) => read(&client, args).await,
        Command::Profile(args) => profile(&client, args).await,
        Command::Stream(args) => stream(&client, args).await,
    }
}

async fn hook(client: &FuncClient, args: HookArgs) -> Result<()> {
    client.hook(args.event_type, &args.function).await?;
    write_stdout(&format!("Hooked event {} to {}.", args.event_type, args.function)).await?;
    Ok(())
}

async fn unhook(client: &FuncClient, args: UnhookArgs) -> Result<()> {
    client.unhook(args.event_type).await?;
    write_stdout(&format!("Unhooked event {}.", args.event_type)).await?;
    Ok(())
}

async fn register(client: &FuncClient, args: RegisterArgs) -> Result<()> {
    let request = RegisterUserRequest {
        username: args.username.clone(),
    };
    match call::<_, RegisterUserReply>(client, Function::Register, &request).await? {
        Reply::Done(_) => write_stdout(&format!("Registered user {}.", args.username)).await?,
        Reply::Absent(absence) => {
            let scenario = format!(
                "Registration failed. The username {} is already taken.",
                args.username
            );
            report_absence(&absence, &scenario).await?
        }
        Reply::Rejected(reason) => report_rejection("Registration", &reason).await?,
    }
    Ok(())
}

async fn post(client: &FuncClient, args: WarbleArgs) -> Result<()> {
    let request = WarbleRequest {
        username: args.user.clone(),
        text: args.text,
        parent_id: args.reply.clone(),
    };
    match call::<_, WarbleReply>(client, Function::Warble, &request).await? {
        Reply::Done(reply) => write_stdout(&describe_posted(&reply.warble)).await?,
        Reply::Absent(absence) => {
            let scenario = match &args.reply {
                Some(parent) => format!(
                    "Warbling failed. Either user {} or warble {parent} does not exist.",
                    args.user
                ),
                None => format!("Warbling failed. User {} is not registered.", args.user),
            };
            report_absence(&absence, &scenario).await?
        }
        Reply::Rejected(reason) => report_rejection("Warbling", &reason).await?,
    }
    Ok(())
}

async fn follow(client: &FuncClient, args: FollowArgs) -> Result<()> {
    let request = FollowRequest {
        username: args.user.clone(),
        to_follow: args.to_follow.clone(),
    };
    match call::<_, FollowReply>(client, Function::Follow, &request).await? {
        Reply::Done(_) => {
            write_stdout(&format!("{} now follows {}.", args.user, args.to_follow)).await?
        }
        Reply::Absent(absence) => {
            let scenario = format!(
                "Following failed. Either {} or {} is not registered.",
                args.user, args.to_follow
            );
            report_absence(&absence, &scenario).await?
        }
        Reply::Rejected(reason) => report_rejection("Following", &reason).await?,
    }
    Ok(())
}

async fn read(client: &FuncClient, args: ReadArgs) -> Result<()> {
    let request = ReadRequest {
        warble_id: args.warble_id.clone(),
    };
    match call::<_, ReadReply>(client, Function::Read, &request).await? {
        Reply::Done(reply) => {
            write_stdout(&format!("Thread starting at warble {}:", args.warble_id)).await?;
            for warble in &reply.warbles {
                write_stdout(&describe_in_thread(warble)).await?;
            }
        }
        Reply::Absent(absence) => {
            let scenario = format!(
                "Reading thread failed. Warble {} does not exist.",
                args.warble_id
            );
            report_absence(&absence, &scenario).await?
        }
        Reply::Rejected(reason) => report_rejection("Reading thread", &reason).await?,
    }
    Ok(())
}

async fn profile(client: &FuncClient, args: ProfileArgs) -> Result<()> {
    let request = ProfileRequest {
        username: args.user.clone(),
    };
    match call::<_, ProfileReply>(client, Function::Profile, &request).await? {
        Reply::Done(reply) => {
            for line in describe_profile(&args.user, &reply) {
                write_stdout(&line).await?;
            }
        }
        Reply::Absent(absence) => {
            let scenario = format!(
                "Reading profile failed. User {} is not registered.",
                args.user
            );
            report_absence(&absence, &scenario).await?
        }
        Reply::Rejected(reason) => report_rejection("Reading profile", &reason).await?,
    }
    Ok(())
}

/// Polls for warbles tagged `args.hashtag` newer than the last one printed.
///
/// Starts from the current time, so only warbles posted after the command
/// starts are shown. An unknown hashtag is polled again like any other.
async fn stream(client: &FuncClient, args: StreamArgs) -> Result<()> {
    let mut since = Timestamp::now();
    write_stdout(&format!("Streaming new warbles tagged #{}:", args.hashtag)).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = ticker.tick() => {}
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }

        let request = StreamRequest {
            hashtag: args.hashtag.clone(),
            since,
        };
        match call::<_, StreamReply>(client, Function::Stream, &request).await? {
            Reply::Done(reply) => {
                for warble in &reply.warbles {
                    write_stdout(&describe_streamed(warble)).await?;
                }
                since = advance_cursor(since, &reply.warbles);
            }
            Reply::Absent(absence) => {
                debug!(kind = %absence.kind, message = %absence.message, "nothing to stream yet");
            }
            Reply::Rejected(reason) => {
                report_rejection("Streaming", &reason).await?;
                break;
            }
        }
    }

    Ok(())
}

/// Moves the cursor to the newest timestamp among `warbles`.
fn advance_cursor(since: Timestamp, warbles: &[WarbleRecord]) -> Timestamp {
    warbles
        .iter()
        .map(|warble| warble.timestamp)
        .fold(since, Timestamp::max)
}

struct Absence {
    kind: AbsenceKind,
    message: String,
}

enum Reply<T> {
    Done(T),
    Absent(Absence),
    Rejected(String),
}

async fn call<Req, Rep>(
    client: &FuncClient,
    function: Function,
    request: &Req,
) -> Result<Reply<Rep>>
where
    Req: Serialize,
    Rep: DeserializeOwned,
{
    let payload = Payload::pack(request)?;
    match client.event(function.default_event(), payload).await? {
        EventOutcome::Payload(payload) => Ok(Reply::Done(payload.unpack()?)),
        EventOutcome::Absent { kind, message } => {
            info!(%function, %kind, %message, "event returned no result");
            Ok(Reply::Absent(Absence { kind, message }))
        }
        EventOutcome::Rejected { message } => {
            info!(%function, %message, "event payload rejected");
            Ok(Reply::Rejected(message))
        }
    }
}

/// Prints the scenario message, or the dispatcher's reason when the event is
/// not wired to a function at all.
async fn report_absence(absence: &Absence, scenario: &str) -> Result<()> {
    match absence.kind {
        AbsenceKind::NotConfigured | AbsenceKind::UnknownHandler => {
            write_stdout(&format!("Request not handled: {}.", absence.message)).await?
        }
        AbsenceKind::NotFound | AbsenceKind::AlreadyExists => write_stdout(scenario).await?,
    }
    Ok(())
}

async fn report_rejection(action: &str, reason: &str) -> Result<()> {
    write_stdout(&rejection_line(action, reason)).await?;
    Ok(())
}

fn rejection_line(action: &str, reason: &str) -> String {
    format!("{action} failed. {}.", capitalize(reason))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn describe_posted(warble: &WarbleRecord) -> String {
    let mut lines = vec![
        "Warble stored.".to_string(),
        format!("username: {}", warble.username),
        format!("warble id: {}", warble.id),
        format!("text: {}", warble.text),
    ];
    if let Some(parent) = &warble.parent_id {
        lines.push(format!("reply to: {parent}"));
    }
    lines.push(format!("at: {}", format_time(warble.timestamp)));
    lines.join("\n")
}

fn describe_in_thread(warble: &WarbleRecord) -> String {
    let mut line = format!(
        "Warble Id: {}; User: {}; Text: {}",
        warble.id, warble.username, warble.text
    );
    if let Some(parent) = &warble.parent_id {
        line.push_str(&format!("; Reply To: {parent}"));
    }
    line
}

fn describe_streamed(warble: &WarbleRecord) -> String {
    format!(
        "Warble Id: {}; User: {}; Text: {}; Time: {}",
        warble.id,
        warble.username,
        warble.text,
        format_time(warble.timestamp)
    )
}

fn describe_profile(username: &str, profile: &ProfileReply) -> Vec<String> {
    let mut lines = vec![format!(
        "User {username} has {} followers:",
        profile.followers.len()
    )];
    lines.extend(profile.followers.iter().map(|name| format!("  {name}")));
    lines.push(format!(
        "User {username} follows {} users:",
        profile.following.len()
    ));
    lines.extend(profile.following.iter().map(|name| format!("  {name}")));
    lines
}

fn format_time(timestamp: Timestamp) -> String {
    match timestamp.to_datetime() {
        Some(at) => at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => format!("{}s", timestamp.seconds),
    }
}

async fn write_stdout(line: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
