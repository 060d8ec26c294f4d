pub mod dex;
pub mod wallets;
