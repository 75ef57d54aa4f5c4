use std::path::PathBuf;

use parqueo_core::models::resolve_unit;
use parqueo_core::repository::{ActiveRepository, RecordRepository};
use parqueo_core::{AudioChange, ListingLoad, RecordEdit, RecordListing};

use crate::cli::VehicleArg;
use crate::commands::common::{
    find_record, normalize_record_identifier, parse_date, parse_entry_time, read_attachment,
    Context, Session,
};
use crate::error::CliError;

/// Changes requested on the command line; unset fields keep their value
#[derive(Default)]
pub struct EditArgs {
    pub plate: Option<String>,
    pub vehicle: Option<VehicleArg>,
    pub entered_at: Option<String>,
    pub note: Option<String>,
    pub property: Option<String>,
    pub unit: Option<String>,
    pub free: Option<bool>,
    pub collected: Option<bool>,
    pub collected_on: Option<String>,
    pub audio: Option<PathBuf>,
    pub remove_audio: bool,
}

impl EditArgs {
    /// Overlay the requested changes on `edit`. Unit selection is resolved
    /// separately.
    pub fn apply_to(self, mut edit: RecordEdit) -> Result<RecordEdit, CliError> {
        if let Some(plate) = self.plate {
            edit.plate = plate;
        }
        if let Some(vehicle) = self.vehicle {
            edit.vehicle_type = vehicle.into();
        }
        if let Some(raw) = self.entered_at.as_deref() {
            edit.entered_at = parse_entry_time(raw)?;
        }
        if let Some(note) = self.note {
            edit.note = Some(note);
        }
        if let Some(free) = self.free {
            edit.free = free;
        }
        if let Some(collected) = self.collected {
            edit.collected = collected;
        }
        if let Some(raw) = self.collected_on.as_deref() {
            edit.collected_on = Some(parse_date(raw)?);
        }
        if edit.collected && edit.collected_on.is_none() {
            edit.collected_on = Some(chrono::Utc::now().date_naive());
        }
        edit.audio = match (self.audio, self.remove_audio) {
            (Some(path), _) => AudioChange::Replace(read_attachment(&path)?),
            (None, true) => AudioChange::Remove,
            (None, false) => AudioChange::Keep,
        };
        Ok(edit)
    }
}

pub async fn run_edit(id: &str, args: EditArgs, context: &Context) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let session = Session::open(context)?;
    let listing = RecordListing::new(&session.remote, &session.queue, &session.connectivity);

    let ListingLoad::Fresh { rows, .. } = listing.load().await? else {
        return Err(CliError::RecordNotFound(normalized_id));
    };
    let current = find_record(&rows, &normalized_id)?;

    let unit_id = match (args.property.as_deref(), args.unit.as_deref()) {
        (Some(property), Some(unit)) => {
            let repository =
                ActiveRepository::select(&session.connectivity, &session.remote, &session.queue);
            let units = repository.units().await?;
            let resolved = resolve_unit(&units, property, unit)
                .ok_or_else(|| CliError::UnknownUnit(format!("{property} {unit}")))?;
            Some(resolved.id.clone())
        }
        _ => None,
    };

    let mut edit = args.apply_to(RecordEdit::from_record(&current.record))?;
    if unit_id.is_some() {
        edit.unit_id = unit_id;
    }

    let updated = listing.update_record(&current.record, edit).await?;
    println!("{normalized_id}  {}  {}", updated.plate, updated.fee);
    Ok(())
}
