use clap::Subcommand;

use crate::common::build_engine;

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user (or update an existing one by chat id)
    Add {
        chat_id: i64,
        #[arg(long, default_value = "Europe/Moscow")]
        timezone: String,
    },
    /// Stop delivering notifications to a user
    Deactivate { user_id: i64 },
    /// Delete a user and everything stored about them
    Delete { user_id: i64 },
    /// List active users
    List,
}

pub fn run(action: UserAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine()?;
    match action {
        UserAction::Add { chat_id, timezone } => {
            let user = engine.db.upsert_user(chat_id, &timezone)?;
            println!("user {} (chat {}, {})", user.id, user.chat_id, user.timezone);
        }
        UserAction::Deactivate { user_id } => {
            engine.db.set_user_active(user_id, false)?;
            let removed = engine.scheduler.remove_all_for_user(user_id)?;
            println!("user {user_id} deactivated, {removed} pending jobs removed");
        }
        UserAction::Delete { user_id } => {
            engine.scheduler.remove_all_for_user(user_id)?;
            engine.db.delete_user(user_id)?;
            println!("user {user_id} deleted");
        }
        UserAction::List => {
            for user in engine.db.list_active_users()? {
                println!("{}\tchat {}\t{}", user.id, user.chat_id, user.timezone);
            }
        }
    }
    Ok(())
}
