use parqueo_core::repository::{ActiveRepository, RecordRepository};

use crate::commands::common::{Context, Session};
use crate::error::CliError;

pub async fn run_units(context: &Context) -> Result<(), CliError> {
    let session = Session::open(context)?;
    let repository =
        ActiveRepository::select(&session.connectivity, &session.remote, &session.queue);
    let units = repository.units().await?;

    if units.is_empty() {
        println!("No units known. Run online once to load them.");
        return Ok(());
    }

    for unit in &units {
        let owner = unit.owner_name.as_deref().unwrap_or("-");
        println!("{:<6}  {:<16}  {owner}", unit.id.to_string(), unit.label());
    }
    Ok(())
}
