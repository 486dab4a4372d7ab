pub mod user;
pub mod movie;
pub mod hall;
pub mod session;
pub mod seat;
pub mod order;

pub use user::User;
pub use movie::{Actor, Genre, Movie};
pub use hall::CinemaHall;
pub use session::MovieSession;
pub use seat::{Seat, Ticket};
pub use order::{Order, OrderItem};
