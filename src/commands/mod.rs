pub mod ai;
pub mod moderation;
pub mod premium;
pub mod sticky;
pub mod trigger;

use crate::{Data, Error};

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        sticky::stick(),
        sticky::unstick(),
        trigger::trigger(),
        premium::gold(),
        premium::premium(),
        ai::ai_chat(),
        ai::reset_ai(),
        moderation::kick(),
        moderation::ban(),
        moderation::unban(),
        moderation::purge(),
    ]
}
