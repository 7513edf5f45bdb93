//! Command line commands and their handlers.

use clap::{Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;

use wsync::cache::Purge;
use wsync::client::{args, CallOptions, CallOutcome, ClientEvent, Source, TransferOutcome};
use wsync::context::AppContext;
use wsync::settings;
use wsync::sync::{Descriptor, DownloadRequest, ReplayReport, UploadRequest};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Call a web service function
  Call {
    /// Function name, e.g. core_enrol_get_users_courses
    method: String,
    /// Arguments as name=value
    args: Vec<String>,
    /// Always ask the site, and do not cache the answer
    #[arg(long)]
    no_cache: bool,
    /// Queue the call when offline instead of failing
    #[arg(long)]
    sync: bool,
    /// Label for the queued operation
    #[arg(long)]
    name: Option<String>,
    /// Do not report failures as user errors
    #[arg(long)]
    silent: bool,
  },
  /// Upload a file to the user's private area
  Upload {
    path: PathBuf,
    #[arg(long, default_value = "application/octet-stream")]
    mime: String,
    /// Multipart field name for the file
    #[arg(long, default_value = "file")]
    key: String,
  },
  /// Download a content file and remember where it was stored
  Download {
    url: String,
    dest: PathBuf,
    #[arg(long)]
    content: String,
    #[arg(long, default_value_t = 0)]
    index: usize,
  },
  /// Replay queued operations now
  Sync,
  /// Inspect or edit the sync queue
  Queue {
    #[command(subcommand)]
    action: QueueAction,
  },
  /// Remove cached call results
  Purge {
    /// Only remove entries past their TTL
    #[arg(long)]
    expired: bool,
  },
  /// Turn the developer offline switch on or off
  Offline { state: Switch },
  /// Read or change runtime settings
  Setting {
    #[command(subcommand)]
    action: SettingAction,
  },
  /// Turn a site file link into an authenticated download URL
  Pluginfile { url: String },
}

#[derive(Subcommand, Debug)]
pub enum QueueAction {
  List,
  Remove { id: String },
  Clear,
}

#[derive(Subcommand, Debug)]
pub enum SettingAction {
  List,
  Get { name: String },
  /// Value is parsed as JSON, falling back to a plain string
  Set { name: String, value: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Switch {
  On,
  Off,
}

pub async fn run(context: &AppContext, command: Command) -> Result<()> {
  match command {
    Command::Call {
      method,
      args: raw_args,
      no_cache,
      sync,
      name,
      silent,
    } => {
      let params = args::from_pairs(&raw_args)?;
      let mut options = CallOptions::default();
      if no_cache {
        options = options.no_cache();
      }
      if sync {
        let label = name.unwrap_or_else(|| method.clone());
        options = options.syncable(Descriptor::new(label, ""));
      }
      if silent {
        options = options.silent();
      }

      match context.client.call_params(&method, params, options).await? {
        CallOutcome::Completed(result) => {
          let origin = match result.source {
            Source::Network => "network".to_string(),
            Source::Cache => format!("cache, stored {}", fmt_time(result.stored_at)),
            Source::StaleCache => format!("expired cache, stored {}", fmt_time(result.stored_at)),
          };
          eprintln!("({})", origin);
          println!("{}", serde_json::to_string_pretty(&result.data)?);
        }
        CallOutcome::Queued(id) => println!("Offline: added to queue as {}", id),
      }
    }

    Command::Upload { path, mime, key } => {
      let mut request = UploadRequest::new(path, mime);
      request.file_key = key;
      report_transfer(context.client.upload_file(request, None).await?);
    }

    Command::Download {
      url,
      dest,
      content,
      index,
    } => {
      let request = DownloadRequest {
        url,
        destination: dest,
        content_id: content,
        file_index: index,
      };
      report_transfer(context.client.download_content(request, None).await?);
    }

    Command::Sync => print_report(&context.sync_now().await),

    Command::Queue { action } => match action {
      QueueAction::List => {
        let pending = context.queue().list()?;
        if pending.is_empty() {
          println!("Queue is empty");
        }
        for op in pending {
          println!(
            "{}  {:<12} site={:<8} {}  {}  (since {})",
            &op.id[..12.min(op.id.len())],
            op.kind().display_name(),
            op.site_id,
            op.descriptor.name,
            op.descriptor.description,
            op.queued_at.format("%Y-%m-%d %H:%M:%S")
          );
        }
      }
      QueueAction::Remove { id } => {
        let matches: Vec<String> = context
          .queue()
          .list()?
          .into_iter()
          .map(|op| op.id)
          .filter(|full| full.starts_with(&id))
          .collect();
        match matches.as_slice() {
          [full] => {
            context.queue().remove(full)?;
            println!("Removed {}", full);
          }
          [] => return Err(eyre!("No queued operation matches {}", id)),
          _ => return Err(eyre!("{} matches several operations", id)),
        }
      }
      QueueAction::Clear => println!("Removed {} operations", context.queue().clear()?),
    },

    Command::Purge { expired } => {
      let scope = if expired { Purge::Expired } else { Purge::All };
      println!("Removed {} cache entries", context.cache().purge(scope)?);
    }

    Command::Offline { state } => {
      let on = matches!(state, Switch::On);
      context.settings.set(settings::DEV_OFFLINE, on)?;
      println!("Offline mode {}", if on { "on" } else { "off" });
    }

    Command::Setting { action } => match action {
      SettingAction::List => {
        for setting in context.settings.all()? {
          let value = if setting.name == settings::CURRENT_TOKEN {
            Value::String("********".to_string())
          } else {
            setting.value
          };
          println!("{} = {}", setting.name, value);
        }
      }
      SettingAction::Get { name } => match context.settings.get(&name)? {
        Some(value) => println!("{}", value),
        None => return Err(eyre!("Setting {} is not set", name)),
      },
      SettingAction::Set { name, value } => {
        let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
        context.settings.set(&name, value)?;
      }
    },

    Command::Pluginfile { url } => println!("{}", context.client.pluginfile_url(&url)?),
  }

  Ok(())
}

pub fn print_event(event: &ClientEvent) {
  match event {
    ClientEvent::Queued { descriptor, .. } => {
      eprintln!("{}: added to the queue, it will be sent when online", descriptor.name)
    }
    ClientEvent::Error { message } => eprintln!("Error: {}", message),
    ClientEvent::SessionInvalidated { message, .. } => {
      eprintln!("Connection to the site lost ({}). Please sign in again.", message)
    }
  }
}

fn report_transfer(outcome: TransferOutcome) {
  match outcome {
    TransferOutcome::Done => println!("Done"),
    TransferOutcome::Queued(id) => println!("Offline: added to queue as {}", id),
  }
}

fn print_report(report: &ReplayReport) {
  if let Some(reason) = report.skipped {
    println!("Sync not run: {:?}", reason);
    return;
  }
  println!(
    "Completed {}, failed {}, other site {}",
    report.completed, report.failed, report.skipped_other_site
  );
}

fn fmt_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
  at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_else(|| "unknown".to_string())
}
