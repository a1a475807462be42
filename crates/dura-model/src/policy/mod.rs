mod poll;
pub use poll::PollPolicy;

mod stop;
pub use stop::StopPolicy;
