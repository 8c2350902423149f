pub mod a_star_bot;
pub mod q_learning_bot;
