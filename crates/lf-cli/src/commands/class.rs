//! Class command implementation

use anyhow::Result;

use crate::cli::{ClassArgs, ClassCommand, GlobalArgs};
use crate::context::RuntimeContext;

/// Execute the class command
pub async fn execute(args: &ClassArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;

    match &args.command {
        ClassCommand::Delete { class, user } => {
            ctx.dataset().delete_class(*class, &user.user)?;
            println!("Deleted class {class}");
        }
    }

    Ok(())
}
