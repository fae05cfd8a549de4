use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::{Deserialize, Serialize};

const TOKEN_LEN: usize = 12;

/// Body for `POST /customers/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Body for `POST /products/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPayload {
    pub name: String,
    pub price: u32,
    pub description: String,
}

fn token<R: Rng>(rng: &mut R) -> String {
    Alphanumeric.sample_string(rng, TOKEN_LEN).to_lowercase()
}

/// Fresh customer with a unique email so repeated creates don't collide
pub fn sample_customer<R: Rng>(rng: &mut R) -> CustomerPayload {
    let phone_digits: u64 = rng.gen_range(100_000_000..1_000_000_000);
    CustomerPayload {
        name: "Test Customer".to_string(),
        email: format!("test{}@example.com", token(rng)),
        phone: format!("+1{phone_digits}"),
    }
}

/// Fresh product; price is a whole number in `10..=109`
pub fn sample_product<R: Rng>(rng: &mut R) -> ProductPayload {
    ProductPayload {
        name: format!("Product {}", token(rng)),
        price: rng.gen_range(10..110),
        description: "Test product for load testing".to_string(),
    }
}
