//! Seed the catalog with products.
//!
//! Reads a YAML list of products, validates each entry with the same rules
//! as the add-product form and inserts the valid ones.
//!
//! ```yaml
//! - name: Espresso Machine
//!   description: 15 bar pump, steam wand.
//!   image_url: https://images.example.com/espresso.jpg
//!   price: "249.00"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use flowmazon_storefront::db::{self, ProductRepository};
use flowmazon_storefront::models::NewProduct;

/// A product entry as written in the seed file.
///
/// Prices are strings so amounts keep their exact decimal form.
#[derive(Debug, Deserialize)]
struct SeedProduct {
    name: String,
    description: String,
    image_url: String,
    price: String,
}

impl SeedProduct {
    fn validate(&self) -> Result<NewProduct, String> {
        NewProduct::parse(
            Some(&self.name),
            Some(&self.description),
            Some(&self.image_url),
            Some(&self.price),
        )
        .map_err(|e| format!("{}: {e}", self.name))
    }
}

/// Parse and validate a seed file's contents.
///
/// Returns the valid products and one message per rejected entry.
fn parse_seed_file(content: &str) -> Result<(Vec<NewProduct>, Vec<String>), serde_yaml::Error> {
    let entries: Vec<SeedProduct> = serde_yaml::from_str(content)?;

    let mut products = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for entry in &entries {
        match entry.validate() {
            Ok(product) => products.push(product),
            Err(e) => errors.push(e),
        }
    }

    Ok((products, errors))
}

/// Seed products from a YAML file.
///
/// Validation happens before connecting; any invalid entry aborts the run.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the file cannot be read
/// or parsed, an entry is invalid, or an insert fails.
pub async fn products(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;

    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading products from file");

    let content = tokio::fs::read_to_string(path).await?;
    let (products, errors) = parse_seed_file(&content)?;

    if !errors.is_empty() {
        error!("Product validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let repo = ProductRepository::new(&pool);
    for product in &products {
        let created = repo.create(product).await?;
        info!(product_id = %created.id, name = %created.name, "Inserted product");
    }

    info!("Seeding complete!");
    info!("  Products inserted: {}", products.len());

    Ok(())
}
