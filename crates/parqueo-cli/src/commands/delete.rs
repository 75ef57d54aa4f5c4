use parqueo_core::{ListingLoad, RecordListing};

use crate::commands::common::{find_record, normalize_record_identifier, Context, Session};
use crate::error::CliError;

pub async fn run_delete(id: &str, context: &Context) -> Result<(), CliError> {
    let normalized_id = normalize_record_identifier(id)?;
    let session = Session::open(context)?;
    let listing = RecordListing::new(&session.remote, &session.queue, &session.connectivity);

    let ListingLoad::Fresh { rows, .. } = listing.load().await? else {
        return Err(CliError::RecordNotFound(normalized_id));
    };
    let current = find_record(&rows, &normalized_id)?;

    listing.delete_record(&current.record).await?;
    println!("{normalized_id}");
    Ok(())
}
