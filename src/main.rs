#![warn(clippy::unwrap_used)]

use std::{collections::HashSet, path::PathBuf};

use clap::{Parser, Subcommand};
use letterfold::{
    assets::LocalAssetLoader,
    configuration::{ExportConfiguration, FontsConfiguration},
    error::ContextError,
    export::{DirectorySink, ExportState, Exporter, LogNotifier},
    fonts::FontBook,
    letter::Letter,
    raster::CpuRasterizer,
    store::{JsonLetterStore, LetterStore as _, StaticIdentity, UserDirectory as _},
};

#[derive(Parser)]
#[command(version, long_about = None)]
struct CliArguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export a letter to a four pages PDF document
    Export {
        #[arg(long = "letter", help = "Path to the letter file in the JSON format", conflicts_with_all = ["store_path", "id"])]
        letter_path: Option<PathBuf>,
        #[arg(long = "store", help = "Path to the letter store in the JSON format", requires = "id")]
        store_path: Option<PathBuf>,
        #[arg(long = "id", help = "Identifier of the letter to export from the store")]
        id: Option<String>,
        #[arg(long = "fonts", help = "Path to the font configuration file in the JSON format")]
        fonts_path: Option<PathBuf>,
        #[arg(long = "configuration", help = "Path to the export configuration file in the JSON format")]
        configuration_path: Option<PathBuf>,
        #[arg(long = "output", help = "Directory the PDF document is written to", default_value = ".")]
        output_directory: PathBuf,
    },
    /// List the letters of a store, the most recent first
    List {
        #[arg(long = "store", help = "Path to the letter store in the JSON format")]
        store_path: PathBuf,
        #[arg(long = "user", help = "Only list the letters sent or received by this user")]
        user_id: Option<String>,
    },
    /// Register a user letters can be sent to
    Register {
        #[arg(long = "store", help = "Path to the letter store in the JSON format")]
        store_path: PathBuf,
        #[arg(long = "user", help = "Identifier of the user")]
        user_id: String,
        #[arg(long = "first-name")]
        first_name: String,
        #[arg(long = "last-name")]
        last_name: String,
        #[arg(long = "email")]
        email: String,
    },
    /// Address a stored letter to the user registered with the given email address
    Send {
        #[arg(long = "store", help = "Path to the letter store in the JSON format")]
        store_path: PathBuf,
        #[arg(long = "id", help = "Identifier of the letter to send")]
        id: String,
        #[arg(long = "email", help = "Email address of the recipient")]
        email: String,
    },
}

fn main() {
    env_logger::init();

    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<(), ContextError> {
    let cli_arguments = CliArguments::parse();

    match cli_arguments.command {
        Command::Export {
            letter_path,
            store_path,
            id,
            fonts_path,
            configuration_path,
            output_directory,
        } => {
            let letter = match (letter_path, store_path, id) {
                (Some(letter_path), _, _) => Letter::from_path(&letter_path)?,
                (None, Some(store_path), Some(id)) => {
                    let store = JsonLetterStore::open(&store_path, Box::new(StaticIdentity::anonymous()))?;
                    store.get(&id).ok_or(ContextError::with_context(format!(
                        "Failed to find the letter {:?} in {:?}",
                        id, store_path
                    )))?
                }
                _ => {
                    return Err(ContextError::with_context(
                        "Either a letter file or a store and an identifier must be given",
                    ))
                }
            };

            let configuration = match configuration_path {
                Some(configuration_path) => ExportConfiguration::from_path(&configuration_path)?,
                None => ExportConfiguration::default(),
            };
            let fonts = match fonts_path {
                Some(fonts_path) => FontBook::from_configuration(&FontsConfiguration::from_path(&fonts_path)?)?,
                None => {
                    log::warn!("No font configuration given, the text of the letter will not be drawn");
                    FontBook::empty()
                }
            };

            let mut exporter = Exporter::new(
                &fonts,
                &LocalAssetLoader,
                &configuration,
                CpuRasterizer::new(&fonts),
                LogNotifier,
                DirectorySink::new(output_directory),
            );
            match exporter.export(Some(&letter)) {
                ExportState::Success { path } => {
                    println!("{}", path.display());
                    Ok(())
                }
                ExportState::Failed { message } => Err(ContextError::with_context(message.clone())),
                state => Err(ContextError::with_context(format!(
                    "The export ended in an unexpected state: {:?}",
                    state
                ))),
            }
        }
        Command::List { store_path, user_id } => {
            let store = JsonLetterStore::open(&store_path, Box::new(StaticIdentity(user_id.clone())))?;
            let letters = match &user_id {
                Some(user_id) => {
                    let mut letters = store.list_sent(user_id);
                    letters.extend(store.list_received(user_id));
                    letters.sort_by(|first, second| second.created_at.cmp(&first.created_at));
                    // A letter sent to oneself is both sent and received
                    let mut listed_ids = HashSet::new();
                    letters.retain(|letter| listed_ids.insert(letter.id.clone()));
                    letters
                }
                None => store.list_all(),
            };

            for letter in letters {
                println!(
                    "{}\t{}\t{}",
                    letter.id.unwrap_or_default(),
                    if letter.is_read { "read" } else { "unread" },
                    letter.content.title.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Register {
            store_path,
            user_id,
            first_name,
            last_name,
            email,
        } => {
            let mut store = JsonLetterStore::open(&store_path, Box::new(StaticIdentity::signed_in(&user_id)))?;
            store.create_user_profile(&user_id, first_name.trim(), last_name.trim(), email.trim())
        }
        Command::Send { store_path, id, email } => {
            let mut store = JsonLetterStore::open(&store_path, Box::new(StaticIdentity::anonymous()))?;
            let recipient = store
                .search_user_by_email(email.trim())
                .ok_or(ContextError::with_context(format!(
                    "No user is registered with the email address {:?}",
                    email
                )))?;
            store.assign_recipient(&id, &recipient.as_recipient())?;
            println!("{}\t{} {}", id, recipient.first_name, recipient.last_name);
            Ok(())
        }
    }
}
