use std::path::PathBuf;

use parqueo_core::{CaptureForm, CaptureOutcome, CaptureWorkflow};

use crate::cli::VehicleArg;
use crate::commands::common::{parse_entry_time, read_attachment, Context, Session};
use crate::error::CliError;

/// Values collected from the `register` arguments
pub struct RegisterArgs {
    pub plate: String,
    pub property: String,
    pub unit: String,
    pub vehicle: VehicleArg,
    pub free: bool,
    pub note: Option<String>,
    pub entered_at: Option<String>,
    pub photo: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

impl RegisterArgs {
    pub fn into_form(self) -> Result<CaptureForm, CliError> {
        Ok(CaptureForm {
            plate: self.plate,
            vehicle_type: self.vehicle.into(),
            property: self.property,
            unit: self.unit,
            note: self.note,
            entered_at: self.entered_at.as_deref().map(parse_entry_time).transpose()?,
            free: self.free,
            photo: self.photo.as_deref().map(read_attachment).transpose()?,
            audio: self.audio.as_deref().map(read_attachment).transpose()?,
        })
    }
}

pub async fn run_register(args: RegisterArgs, context: &Context) -> Result<(), CliError> {
    let form = args.into_form()?;
    let session = Session::open(context)?;
    session.catch_up().await?;

    let mut workflow = CaptureWorkflow::new(&session.remote, &session.queue, &session.connectivity)
        .with_user(session.config.user_id());
    workflow.refresh_units().await?;
    let outcome = workflow.submit(form).await?;

    match &outcome {
        CaptureOutcome::Saved { id, record } => {
            println!("{id}  {}  {}", record.plate, record.fee);
        }
        CaptureOutcome::SavedOffline { record } => {
            println!("pending  {}  {}", record.plate, record.fee);
        }
    }
    eprintln!("{}", outcome.message());
    Ok(())
}
