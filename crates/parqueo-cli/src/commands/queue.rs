use crate::commands::common::{format_queue_lines, queue_item, Context, QueueItem, Session};
use crate::error::CliError;

pub fn run_queue(as_json: bool, context: &Context) -> Result<(), CliError> {
    let session = Session::open(context)?;
    let items = session
        .queue
        .pending()?
        .iter()
        .enumerate()
        .map(|(index, operation)| queue_item(index + 1, operation))
        .collect::<Vec<QueueItem>>();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for line in format_queue_lines(&items) {
        println!("{line}");
    }
    Ok(())
}
