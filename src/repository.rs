use crate::models::{
    Car, CarFilter, CarStatus, CarUpdate, NewCar, Role, User, UserStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// RepositoryError
///
/// Store failures, classified so handlers can translate them into the API's error taxonomy.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A UNIQUE constraint rejected the write (e.g. an email already registered).
    #[error("{0}")]
    Duplicate(String),
    /// A foreign key or check constraint rejected the write.
    #[error("{0}")]
    Constraint(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            if db.is_unique_violation() {
                return Self::Duplicate(duplicate_message(db.constraint()));
            }
            if db.is_foreign_key_violation() || db.is_check_violation() {
                return Self::Constraint(db.message().to_string());
            }
        }
        Self::Database(err)
    }
}

fn duplicate_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(name) if name.contains("email") => "User already exists".to_string(),
        Some(name) => format!("Duplicate value violates {name}"),
        None => "Duplicate value".to_string(),
    }
}

/// NewUser
///
/// A user about to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Repository Trait
///
/// The abstract contract for every persistence operation. Handlers only see
/// `Arc<dyn Repository>`, so Postgres and the in-memory double are interchangeable.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Credential Store ---
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    // Fails with `Duplicate` when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, RepositoryError>;

    // --- Listing Store ---
    // Newest first.
    async fn list_cars(&self, filter: &CarFilter) -> Result<Vec<Car>, RepositoryError>;
    async fn list_cars_by_seller(&self, seller_id: Uuid) -> Result<Vec<Car>, RepositoryError>;
    async fn get_car(&self, id: Uuid) -> Result<Option<Car>, RepositoryError>;
    // Fails with `Constraint` when the seller does not exist.
    async fn create_car(
        &self,
        seller_id: Uuid,
        car: NewCar,
        images: Vec<String>,
    ) -> Result<Car, RepositoryError>;
    // Replaces provided fields and appends images in one statement.
    async fn update_car(&self, id: Uuid, update: CarUpdate) -> Result<Option<Car>, RepositoryError>;
    async fn set_car_status(
        &self,
        id: Uuid,
        status: CarStatus,
    ) -> Result<Option<Car>, RepositoryError>;
    // Returns the deleted listing so its images can be cleaned up.
    async fn delete_car(&self, id: Uuid) -> Result<Option<Car>, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, status, created_at, updated_at";

// Every listing read joins the seller's public details.
const CAR_SELECT: &str = r#"
    SELECT c.id, c.seller_id, c.brand, c.model, c.year, c.mileage, c.price,
           c.condition, c.description, c.images, c.status, c.created_at, c.updated_at,
           u.name AS seller_name, u.email AS seller_email
    FROM cars c
    JOIN users u ON u.id = c.seller_id
"#;

/// PostgresRepository
///
/// The concrete implementation of `Repository`, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Wraps a data-modifying statement that `RETURNING *` in a CTE so the
    /// result carries the same seller join as every other listing read.
    fn with_seller_join(statement: &str) -> String {
        format!(
            r#"
            WITH changed AS ({statement})
            SELECT c.id, c.seller_id, c.brand, c.model, c.year, c.mileage, c.price,
                   c.condition, c.description, c.images, c.status, c.created_at, c.updated_at,
                   u.name AS seller_name, u.email AS seller_email
            FROM changed c
            JOIN users u ON u.id = c.seller_id
            "#
        )
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_user
    ///
    /// Inserts with default status `active`. The UNIQUE constraint on `email`
    /// is the authority on duplicates; its violation surfaces as `Duplicate`.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, RepositoryError> {
        let query = format!(
            "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_cars
    ///
    /// Builds the conjunctive filter with QueryBuilder so every value is a bound parameter.
    async fn list_cars(&self, filter: &CarFilter) -> Result<Vec<Car>, RepositoryError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(CAR_SELECT);
        builder.push(" WHERE TRUE");

        if let Some(term) = &filter.search {
            let pattern = like_pattern(term);
            builder.push(" AND (c.brand ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR c.model ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(brand) = &filter.brand {
            builder.push(" AND LOWER(c.brand) = LOWER(");
            builder.push_bind(brand.clone());
            builder.push(")");
        }
        if let Some(condition) = filter.condition {
            builder.push(" AND c.condition = ");
            builder.push_bind(condition);
        }
        if let Some(status) = filter.status {
            builder.push(" AND c.status = ");
            builder.push_bind(status);
        }
        if let Some(min) = filter.min_price {
            builder.push(" AND c.price >= ");
            builder.push_bind(min);
        }
        if let Some(max) = filter.max_price {
            builder.push(" AND c.price <= ");
            builder.push_bind(max);
        }
        if let Some(min) = filter.min_year {
            builder.push(" AND c.year >= ");
            builder.push_bind(min);
        }
        if let Some(max) = filter.max_year {
            builder.push(" AND c.year <= ");
            builder.push_bind(max);
        }

        builder.push(" ORDER BY c.created_at DESC");

        Ok(builder
            .build_query_as::<Car>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_cars_by_seller(&self, seller_id: Uuid) -> Result<Vec<Car>, RepositoryError> {
        let query = format!("{CAR_SELECT} WHERE c.seller_id = $1 ORDER BY c.created_at DESC");
        Ok(sqlx::query_as::<_, Car>(&query)
            .bind(seller_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_car(&self, id: Uuid) -> Result<Option<Car>, RepositoryError> {
        let query = format!("{CAR_SELECT} WHERE c.id = $1");
        Ok(sqlx::query_as::<_, Car>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_car(
        &self,
        seller_id: Uuid,
        car: NewCar,
        images: Vec<String>,
    ) -> Result<Car, RepositoryError> {
        let query = Self::with_seller_join(
            "INSERT INTO cars (id, seller_id, brand, model, year, mileage, price, condition, description, images) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        );
        Ok(sqlx::query_as::<_, Car>(&query)
            .bind(Uuid::new_v4())
            .bind(seller_id)
            .bind(car.brand)
            .bind(car.model)
            .bind(car.year)
            .bind(car.mileage)
            .bind(car.price)
            .bind(car.condition)
            .bind(car.description)
            .bind(images)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_car
    ///
    /// COALESCE keeps stored values for absent fields. `$10` says whether the
    /// description was supplied, so `NULL` in `$8` can clear it. `images || $9` appends
    /// atomically, so concurrent uploads never drop each other's images.
    /// `seller_id` never changes after creation.
    async fn update_car(&self, id: Uuid, update: CarUpdate) -> Result<Option<Car>, RepositoryError> {
        let query = Self::with_seller_join(
            r#"
            UPDATE cars
            SET brand = COALESCE($2, brand),
                model = COALESCE($3, model),
                year = COALESCE($4, year),
                mileage = COALESCE($5, mileage),
                price = COALESCE($6, price),
                condition = COALESCE($7, condition),
                description = CASE WHEN $10::BOOLEAN THEN $8::TEXT ELSE description END,
                images = images || $9::TEXT[],
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        );
        let description_supplied = update.description.is_some();
        Ok(sqlx::query_as::<_, Car>(&query)
            .bind(id)
            .bind(update.brand)
            .bind(update.model)
            .bind(update.year)
            .bind(update.mileage)
            .bind(update.price)
            .bind(update.condition)
            .bind(update.description.flatten())
            .bind(update.images)
            .bind(description_supplied)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_car_status(
        &self,
        id: Uuid,
        status: CarStatus,
    ) -> Result<Option<Car>, RepositoryError> {
        let query = Self::with_seller_join(
            "UPDATE cars SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        );
        Ok(sqlx::query_as::<_, Car>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_car(&self, id: Uuid) -> Result<Option<Car>, RepositoryError> {
        let query = Self::with_seller_join("DELETE FROM cars WHERE id = $1 RETURNING *");
        Ok(sqlx::query_as::<_, Car>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

// --- In-Memory Implementation (For Tests) ---

#[derive(Default)]
struct MemoryTables {
    users: Vec<User>,
    // Insertion order; reads reverse it to return newest first.
    cars: Vec<Car>,
}

/// InMemoryRepository
///
/// A `Repository` held in process memory, used by the test suites to exercise
/// handlers and the session client without a database. Mirrors the Postgres
/// constraints: unique email, existing seller, append-only images.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryTables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryTables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_seller(tables: &MemoryTables, mut car: Car) -> Car {
        if let Some(seller) = tables.users.iter().find(|u| u.id == car.seller_id) {
            car.seller_name = Some(seller.name.clone());
            car.seller_email = Some(seller.email.clone());
        }
        car
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.read().users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.write();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::Duplicate(duplicate_message(Some(
                "users_email_key",
            ))));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.read().users.iter().rev().cloned().collect())
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.write();
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.status = status;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn list_cars(&self, filter: &CarFilter) -> Result<Vec<Car>, RepositoryError> {
        let tables = self.read();
        Ok(tables
            .cars
            .iter()
            .rev()
            .filter(|car| filter.matches(car))
            .map(|car| Self::with_seller(&tables, car.clone()))
            .collect())
    }

    async fn list_cars_by_seller(&self, seller_id: Uuid) -> Result<Vec<Car>, RepositoryError> {
        let tables = self.read();
        Ok(tables
            .cars
            .iter()
            .rev()
            .filter(|car| car.seller_id == seller_id)
            .map(|car| Self::with_seller(&tables, car.clone()))
            .collect())
    }

    async fn get_car(&self, id: Uuid) -> Result<Option<Car>, RepositoryError> {
        let tables = self.read();
        Ok(tables
            .cars
            .iter()
            .find(|car| car.id == id)
            .map(|car| Self::with_seller(&tables, car.clone())))
    }

    async fn create_car(
        &self,
        seller_id: Uuid,
        car: NewCar,
        images: Vec<String>,
    ) -> Result<Car, RepositoryError> {
        let mut tables = self.write();
        if !tables.users.iter().any(|u| u.id == seller_id) {
            return Err(RepositoryError::Constraint(
                "seller does not reference an existing user".to_string(),
            ));
        }

        let now = Utc::now();
        let created = Car {
            id: Uuid::new_v4(),
            seller_id,
            brand: car.brand,
            model: car.model,
            year: car.year,
            mileage: car.mileage,
            price: car.price,
            condition: car.condition,
            description: car.description,
            images,
            status: CarStatus::Available,
            created_at: now,
            updated_at: now,
            seller_name: None,
            seller_email: None,
        };
        tables.cars.push(created.clone());
        Ok(Self::with_seller(&tables, created))
    }

    async fn update_car(&self, id: Uuid, update: CarUpdate) -> Result<Option<Car>, RepositoryError> {
        let mut tables = self.write();
        let Some(car) = tables.cars.iter_mut().find(|car| car.id == id) else {
            return Ok(None);
        };

        if let Some(brand) = update.brand {
            car.brand = brand;
        }
        if let Some(model) = update.model {
            car.model = model;
        }
        if let Some(year) = update.year {
            car.year = year;
        }
        if let Some(mileage) = update.mileage {
            car.mileage = mileage;
        }
        if let Some(price) = update.price {
            car.price = price;
        }
        if let Some(condition) = update.condition {
            car.condition = condition;
        }
        if let Some(description) = update.description {
            car.description = description;
        }
        car.images.extend(update.images);
        car.updated_at = Utc::now();

        let updated = car.clone();
        Ok(Some(Self::with_seller(&tables, updated)))
    }

    async fn set_car_status(
        &self,
        id: Uuid,
        status: CarStatus,
    ) -> Result<Option<Car>, RepositoryError> {
        let mut tables = self.write();
        let Some(car) = tables.cars.iter_mut().find(|car| car.id == id) else {
            return Ok(None);
        };
        car.status = status;
        car.updated_at = Utc::now();

        let updated = car.clone();
        Ok(Some(Self::with_seller(&tables, updated)))
    }

    async fn delete_car(&self, id: Uuid) -> Result<Option<Car>, RepositoryError> {
        let mut tables = self.write();
        let Some(index) = tables.cars.iter().position(|car| car.id == id) else {
            return Ok(None);
        };
        let removed = tables.cars.remove(index);
        Ok(Some(Self::with_seller(&tables, removed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("toy"), "%toy%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_duplicate_message_names_email() {
        assert_eq!(duplicate_message(Some("users_email_key")), "User already exists");
        assert_eq!(duplicate_message(None), "Duplicate value");
    }
}
