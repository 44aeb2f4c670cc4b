pub mod fixture;

pub use fixture::FixtureProvider;
