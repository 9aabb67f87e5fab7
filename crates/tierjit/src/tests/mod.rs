mod failures;
mod storm;
