pub mod achievements;
pub mod bets;
pub mod events;
pub mod persistent;
pub mod prizes;
pub mod rating;
pub mod roulette;
pub mod users;
