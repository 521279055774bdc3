mod blocking;
mod cascade;
mod common;
mod evaluation;
