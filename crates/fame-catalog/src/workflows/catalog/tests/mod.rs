mod common;
mod intake;
mod moderation;
