use parqueo_core::listing::total_fee;
use parqueo_core::{ListingLoad, RecordFilter, RecordListing, RecordSource};

use crate::commands::common::{
    format_record_lines, record_to_list_item, Context, RecordListItem, Session,
};
use crate::error::CliError;

pub async fn run_list(
    property: Option<String>,
    unit: Option<String>,
    limit: usize,
    as_json: bool,
    context: &Context,
) -> Result<(), CliError> {
    let session = Session::open(context)?;
    session.catch_up().await?;

    let listing = RecordListing::new(&session.remote, &session.queue, &session.connectivity);
    let ListingLoad::Fresh { rows, source } = listing.load().await? else {
        return Ok(());
    };

    let filter = RecordFilter::new(property, unit);
    let mut matching = filter.apply(&rows);
    let total = total_fee(matching.iter().copied());
    if limit > 0 {
        matching.truncate(limit);
    }

    if as_json {
        let json_items = matching
            .iter()
            .map(|row| record_to_list_item(row))
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if matching.is_empty() {
        println!("No records found.");
    } else {
        for line in format_record_lines(&matching) {
            println!("{line}");
        }
        println!("Total: {total}");
    }
    if source == RecordSource::Cache {
        eprintln!("Showing cached records (offline)");
    }
    Ok(())
}
