use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use labdesk_core::api::Transport;
use labdesk_core::models::{ExaminationInput, NewBilan, NewReferenceValue, ReferenceKind};
use labdesk_core::utils::contains_ignore_case;
use labdesk_core::{AuthError, Config, CredentialStore, LabClient};

use crate::render;

#[derive(Debug, Parser)]
#[command(name = "labdesk", version, about = "Laboratory records from the command line")]
pub struct Cli {
    /// Backend base URL (overrides config and LABDESK_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and start a 24 hour session
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// End the session
    Logout {
        /// Also delete the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show whether a session is active
    Status,
    #[command(subcommand)]
    Patients(PatientCommand),
    #[command(subcommand)]
    Bilan(BilanCommand),
    /// Examination totals for a period (dates as YYYY-MM-DD)
    Listing { start: String, end: String },
    #[command(subcommand)]
    Exams(ExamCommand),
    /// Units, sample types, hospital services and examination categories
    #[command(subcommand)]
    Refs(RefCommand),
    /// Normal-value ranges
    #[command(subcommand)]
    Normals(NormalCommand),
}

#[derive(Debug, Subcommand)]
pub enum PatientCommand {
    /// Search patients by name or code
    Search { term: String },
    /// Show one patient
    Show { code: String },
    /// List a patient's bilans
    Bilans { code: String },
}

#[derive(Debug, Subcommand)]
pub enum BilanCommand {
    /// Show a bilan and its examinations
    Show { num_facture: String },
    /// Register a new bilan for a patient
    Create {
        patient_code: String,
        #[arg(long)]
        num_facture: String,
        #[arg(long, default_value = "")]
        code_labo: String,
        #[arg(long, default_value = "")]
        prescripteur: String,
    },
    /// Enter the result of one examination
    SetResult {
        exam_id: String,
        value: String,
        #[arg(long, default_value = "")]
        comment: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ExamCommand {
    /// List laboratory examinations
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    /// List examination categories
    Categories,
    Add(ExamArgs),
    Edit {
        id: String,
        #[command(flatten)]
        exam: ExamArgs,
    },
    Rm { id: String },
}

#[derive(Debug, Args)]
pub struct ExamArgs {
    #[arg(long)]
    pub designation: String,
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum RefCommand {
    List { kind: ReferenceKind },
    Add { kind: ReferenceKind, name: String },
    Rename { kind: ReferenceKind, id: String, name: String },
    Rm { kind: ReferenceKind, id: String },
}

#[derive(Debug, Subcommand)]
pub enum NormalCommand {
    /// Ranges for one examination
    List { exam_id: String },
    Add(NormalArgs),
    Rm { id: String },
    /// Specific conditions (pregnancy, fasting, ...)
    Conditions,
}

#[derive(Debug, Args)]
pub struct NormalArgs {
    pub exam_id: String,
    #[arg(long)]
    pub min: f64,
    #[arg(long)]
    pub max: Option<f64>,
    /// H or F
    #[arg(long)]
    pub sex: Option<String>,
    #[arg(long)]
    pub min_age: Option<i64>,
    #[arg(long)]
    pub max_age: Option<i64>,
    /// Creates the condition first, like the reference values screen
    #[arg(long)]
    pub condition: Option<String>,
}

pub async fn dispatch<T: Transport>(command: Command, client: &LabClient<T>, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { username, remember } => login(client, config, username, remember).await,
        Command::Logout { forget } => {
            client.logout();
            if forget {
                if let Some(username) = config.last_username.as_deref() {
                    let credentials = CredentialStore::for_backend(client.base_url());
                    if let Err(e) = credentials.forget(username) {
                        warn!(error = %e, "Could not delete remembered password");
                    }
                }
            }
            println!("Logged out.");
            Ok(())
        }
        Command::Status => {
            let store = client.session();
            println!("Server: {}", client.base_url());
            match store.session() {
                Some(session) => println!("{}", render::session(&session, store.now())),
                None => println!("Not logged in."),
            }
            Ok(())
        }
        Command::Patients(cmd) => patients(client, cmd).await,
        Command::Bilan(cmd) => bilan(client, cmd).await,
        Command::Listing { start, end } => {
            let items = client.listing(&start, &end).await?;
            print!("{}", render::listing(&start, &end, &items));
            Ok(())
        }
        Command::Exams(cmd) => exams(client, cmd).await,
        Command::Refs(cmd) => refs(client, cmd).await,
        Command::Normals(cmd) => normals(client, cmd).await,
    }
}

async fn login<T: Transport>(
    client: &LabClient<T>,
    config: &mut Config,
    username: Option<String>,
    remember: bool,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(u) => u,
        None => prompt("Username: ")?,
    };

    let credentials = CredentialStore::for_backend(client.base_url());
    let stored = if remember { None } else { credentials.recall(&username) };
    let used_stored = stored.is_some();
    let mut password = match stored {
        Some(password) => password,
        None => read_password()?,
    };

    let mut replace_stored = remember;
    if let Err(err) = client.login(&username, &password).await {
        if !should_reprompt(&err, used_stored) {
            return Err(err.into());
        }
        eprintln!("The remembered password was refused ({}).", err);
        password = read_password()?;
        client.login(&username, &password).await?;
        replace_stored = true;
    }

    if replace_stored {
        if let Err(e) = credentials.remember(&username, &password) {
            warn!(error = %e, "Could not remember password");
        }
    }
    if let Err(e) = config.remember_username(&username) {
        warn!(error = %e, "Could not save config");
    }

    println!("Logged in as {}.", username);
    Ok(())
}

async fn patients<T: Transport>(client: &LabClient<T>, cmd: PatientCommand) -> Result<()> {
    match cmd {
        PatientCommand::Search { term } => {
            let found = client.search_patients(&term).await?;
            if found.is_empty() {
                println!("No patient matches {:?}.", term);
            } else {
                print!("{}", render::patients(&found));
            }
        }
        PatientCommand::Show { code } => {
            let (patient, bilans) =
                futures::try_join!(client.patient_by_code(&code), client.patient_bilans(&code))?;
            print!("{}", render::patient(&patient));
            print!("{}", render::bilans(&bilans));
        }
        PatientCommand::Bilans { code } => {
            let bilans = client.patient_bilans(&code).await?;
            print!("{}", render::bilans(&bilans));
        }
    }
    Ok(())
}

async fn bilan<T: Transport>(client: &LabClient<T>, cmd: BilanCommand) -> Result<()> {
    match cmd {
        BilanCommand::Show { num_facture } => {
            let details = client.bilan_details(&num_facture).await?;
            print!("{}", render::bilan_details(&details));
        }
        BilanCommand::Create {
            patient_code,
            num_facture,
            code_labo,
            prescripteur,
        } => {
            let created = client
                .create_bilan(&NewBilan {
                    patient_code,
                    num_facture,
                    code_labo,
                    prescripteur,
                })
                .await?;
            println!("Bilan {} created ({}).", created.num_facture, created.status);
        }
        BilanCommand::SetResult {
            exam_id,
            value,
            comment,
        } => {
            client
                .update_examination_result(&exam_id, &value, &comment)
                .await
                .with_context(|| format!("Result for examination {} not saved", exam_id))?;
            println!("Result saved.");
        }
    }
    Ok(())
}

async fn exams<T: Transport>(client: &LabClient<T>, cmd: ExamCommand) -> Result<()> {
    match cmd {
        ExamCommand::List { filter } => {
            let (exams, categories) =
                futures::try_join!(client.lab_examinations(), client.examination_categories())?;
            let shown: Vec<_> = exams
                .into_iter()
                .filter(|e| {
                    filter
                        .as_deref()
                        .map_or(true, |f| contains_ignore_case(&e.designation, f))
                })
                .collect();
            print!("{}", render::examinations(&shown, &categories));
        }
        ExamCommand::Categories => {
            let categories = client.examination_categories().await?;
            print!("{}", render::reference_items(ReferenceKind::ExaminationCategory, &categories));
        }
        ExamCommand::Add(args) => {
            let created = client.create_examination(&args.into_input()).await?;
            println!("Examination {} created.", created.id);
        }
        ExamCommand::Edit { id, exam } => {
            client.update_examination(&id, &exam.into_input()).await?;
            println!("Examination {} updated.", id);
        }
        ExamCommand::Rm { id } => {
            client.delete_examination(&id).await?;
            println!("Examination {} deleted.", id);
        }
    }
    Ok(())
}

impl ExamArgs {
    fn into_input(self) -> ExaminationInput {
        ExaminationInput {
            designation: self.designation,
            contenu: self.content,
            categorie_id: self.category,
        }
    }
}

async fn refs<T: Transport>(client: &LabClient<T>, cmd: RefCommand) -> Result<()> {
    match cmd {
        RefCommand::List { kind } => {
            let items = client.list_reference(kind).await?;
            print!("{}", render::reference_items(kind, &items));
        }
        RefCommand::Add { kind, name } => {
            let item = client.create_reference(kind, &name).await?;
            println!("Added {} ({}).", item.nom, item.id);
        }
        RefCommand::Rename { kind, id, name } => {
            client.rename_reference(kind, &id, &name).await?;
            println!("Renamed {} to {}.", id, name);
        }
        RefCommand::Rm { kind, id } => {
            client.delete_reference(kind, &id).await?;
            println!("Deleted {}.", id);
        }
    }
    Ok(())
}

async fn normals<T: Transport>(client: &LabClient<T>, cmd: NormalCommand) -> Result<()> {
    match cmd {
        NormalCommand::List { exam_id } => {
            let values = client.reference_values(&exam_id).await?;
            print!("{}", render::reference_values(&values));
        }
        NormalCommand::Add(args) => {
            let exams = client.examinations().await?;
            let designation = exams
                .iter()
                .find(|e| e.id == args.exam_id)
                .map(|e| e.designation.clone())
                .with_context(|| format!("No examination with id {}", args.exam_id))?;

            let id_specific_condition = match args.condition.as_deref() {
                Some(label) if !label.trim().is_empty() => {
                    Some(client.create_specific_condition(label).await?.id)
                }
                _ => None,
            };

            client
                .create_reference_value(&NewReferenceValue {
                    id_exam: args.exam_id,
                    designation,
                    min_value: args.min,
                    max_value: args.max,
                    sexe: args.sex,
                    min_age: args.min_age,
                    max_age: args.max_age,
                    id_specific_condition,
                })
                .await?;
            println!("Reference value added.");
        }
        NormalCommand::Rm { id } => {
            client.delete_reference_value(&id).await?;
            println!("Reference value {} deleted.", id);
        }
        NormalCommand::Conditions => {
            let conditions = client.specific_conditions().await?;
            for c in conditions {
                println!("{:>6}  {}", c.id, c.designation);
            }
        }
    }
    Ok(())
}

/// Only a remembered password refused by the server earns a second prompt
fn should_reprompt(err: &AuthError, used_stored: bool) -> bool {
    used_stored && matches!(err, AuthError::Rejected(_))
}

fn read_password() -> Result<String> {
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    anyhow::ensure!(!value.is_empty(), "A username is required");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labdesk_core::api::TransportError;
    use labdesk_core::ApiError;

    #[test]
    fn test_refused_stored_password_prompts_again() {
        let refused = AuthError::Rejected("Identifiant ou mot de passe incorrect".to_string());
        assert!(should_reprompt(&refused, true));
        assert!(!should_reprompt(&refused, false));
    }

    #[test]
    fn test_other_login_failures_do_not_prompt() {
        let down = AuthError::Network(TransportError::new("connection refused"));
        assert!(!should_reprompt(&down, true));
        let garbled = AuthError::InvalidResponse("no token".to_string());
        assert!(!should_reprompt(&garbled, true));
        let api = AuthError::Api(ApiError::NoSession);
        assert!(!should_reprompt(&api, true));
    }
}
