//! Rating writes: the fan-out of one logical rating mutation across its
//! denormalized copies.
//!
//! A rating exists as three physical items: the owner copy (`USER#` partition,
//! "my ratings"), the place copy (`PLACE#` partition, "place ratings"), and
//! the canonical META (`RATING#` partition, co-located with likes/comments and
//! the only holder of authoritative counters). The owner and place copies are
//! written in one atomic transaction; they are the reader-visible existence
//! signal. Everything downstream (META, UserPlace, place aggregate, caffeine
//! total) is best-effort: a failure there leaves secondary state stale, never
//! a failed create.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::warn;

use crate::collaborators::caffeine;
use crate::error::{AppError, AppResult};
use crate::infrastructure::store::{
    field_f64, field_str, Item, ItemKey, ItemStore, UpdateSpec,
};
use crate::keyspace;
use crate::services::aggregates;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingRequest {
    pub place_id: String,
    pub place_name: String,
    pub stars: f64,
    pub drink_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photo_key: Option<String>,
    #[serde(default)]
    pub caffeine_mg: Option<f64>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: Option<String>,
}

/// Tri-state edit payload. For nullable fields: absent leaves the stored
/// attribute untouched, explicit null removes it, a value overwrites it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingPatch {
    pub stars: Option<f64>,
    pub drink_name: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub photo_key: Option<Option<String>>,
    pub caffeine_mg: Option<f64>,
    pub place_name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone)]
pub struct CreatedRating {
    pub rating_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct UpdatedRating {
    pub rating_id: String,
    pub updated_at: String,
}

/// Effect of a patch on one stored attribute.
enum FieldPatch {
    Untouched,
    Set(Value),
    Remove,
}

fn from_option<T: Into<Value>>(value: Option<T>) -> FieldPatch {
    match value {
        Some(v) => FieldPatch::Set(v.into()),
        None => FieldPatch::Untouched,
    }
}

fn from_nullable(value: &Option<Option<String>>) -> FieldPatch {
    match value {
        None => FieldPatch::Untouched,
        Some(None) => FieldPatch::Remove,
        Some(Some(v)) => FieldPatch::Set(Value::String(v.clone())),
    }
}

impl RatingPatch {
    fn field(&self, name: &str) -> FieldPatch {
        match name {
            "stars" => from_option(self.stars),
            "drinkName" => from_option(self.drink_name.clone()),
            "description" => from_nullable(&self.description),
            "photoKey" => from_nullable(&self.photo_key),
            "caffeineMg" => from_option(self.caffeine_mg),
            "placeName" => from_option(self.place_name.clone()),
            "lat" => from_option(self.lat),
            "lng" => from_option(self.lng),
            "address" => from_nullable(&self.address),
            _ => FieldPatch::Untouched,
        }
    }
}

/// Fields carried by META and the owner copy.
const EDITABLE_FIELDS: &[&str] = &[
    "stars",
    "drinkName",
    "description",
    "photoKey",
    "caffeineMg",
    "placeName",
    "lat",
    "lng",
    "address",
];

/// The place copy excludes placeName/lat/lng: those attributes belong to the
/// place itself and are governed by the place-info-changed branch.
const PLACE_COPY_FIELDS: &[&str] = &[
    "stars",
    "drinkName",
    "description",
    "photoKey",
    "caffeineMg",
    "address",
];

/// One generic partial-update builder consumed by all three copy paths, so
/// their semantics cannot drift apart. `updatedAt` is always set.
fn build_partial_update(patch: &RatingPatch, updated_at: &str, fields: &[&str]) -> UpdateSpec {
    let mut spec = UpdateSpec::new().set("updatedAt", json!(updated_at));
    for name in fields {
        match patch.field(name) {
            FieldPatch::Untouched => {}
            FieldPatch::Set(value) => spec = spec.set(*name, value),
            FieldPatch::Remove => spec = spec.remove(*name),
        }
    }
    spec
}

fn validate_stars(stars: f64) -> AppResult<()> {
    if !(1.0..=5.0).contains(&stars) {
        return Err(AppError::Validation(
            "stars must be between 1 and 5".to_string(),
        ));
    }
    let doubled = stars * 2.0;
    if (doubled - doubled.round()).abs() > 1e-9 {
        return Err(AppError::Validation(
            "stars must be a multiple of 0.5".to_string(),
        ));
    }
    Ok(())
}

fn validate_len(name: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::Validation(format!(
            "{} must be between {} and {} characters",
            name, min, max
        )));
    }
    Ok(())
}

fn validate_caffeine(mg: f64) -> AppResult<()> {
    if !(0.0..=1000.0).contains(&mg) {
        return Err(AppError::Validation(
            "caffeineMg must be between 0 and 1000".to_string(),
        ));
    }
    Ok(())
}

fn validate_create(req: &CreateRatingRequest) -> AppResult<()> {
    if req.place_id.is_empty() {
        return Err(AppError::Validation("placeId is required".to_string()));
    }
    validate_len("placeName", &req.place_name, 1, 200)?;
    validate_stars(req.stars)?;
    validate_len("drinkName", &req.drink_name, 1, 100)?;
    if let Some(description) = &req.description {
        validate_len("description", description, 0, 500)?;
    }
    if let Some(mg) = req.caffeine_mg {
        validate_caffeine(mg)?;
    }
    if let Some(address) = &req.address {
        validate_len("address", address, 0, 300)?;
    }
    Ok(())
}

fn validate_patch(patch: &RatingPatch) -> AppResult<()> {
    if let Some(stars) = patch.stars {
        validate_stars(stars)?;
    }
    if let Some(drink_name) = &patch.drink_name {
        validate_len("drinkName", drink_name, 1, 100)?;
    }
    if let Some(Some(description)) = &patch.description {
        validate_len("description", description, 0, 500)?;
    }
    if let Some(mg) = patch.caffeine_mg {
        validate_caffeine(mg)?;
    }
    if let Some(place_name) = &patch.place_name {
        validate_len("placeName", place_name, 1, 200)?;
    }
    if let Some(Some(address)) = &patch.address {
        validate_len("address", address, 0, 300)?;
    }
    Ok(())
}

fn insert_opt(item: &mut Item, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        item.insert(name.to_string(), Value::String(value.clone()));
    }
}

pub struct RatingService {
    store: Arc<dyn ItemStore>,
}

impl RatingService {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        user_id: &str,
        req: CreateRatingRequest,
    ) -> AppResult<CreatedRating> {
        validate_create(&req)?;

        let rating_id = keyspace::new_id();
        let created_at = keyspace::now_iso();
        let caffeine_mg = req
            .caffeine_mg
            .unwrap_or_else(|| caffeine::table_estimate_mg(&req.drink_name) as f64);

        // Denormalized username on the place copy.
        let profile = self
            .store
            .get(&ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK))
            .await?;
        let username = profile
            .as_ref()
            .and_then(|p| field_str(p, "username"))
            .unwrap_or("unknown")
            .to_string();

        let mut owner_copy = Item::new();
        owner_copy.insert("ratingId".into(), json!(rating_id));
        owner_copy.insert("userId".into(), json!(user_id));
        owner_copy.insert("placeId".into(), json!(req.place_id));
        owner_copy.insert("placeName".into(), json!(req.place_name));
        owner_copy.insert("stars".into(), json!(req.stars));
        owner_copy.insert("drinkName".into(), json!(req.drink_name));
        insert_opt(&mut owner_copy, "description", &req.description);
        insert_opt(&mut owner_copy, "photoKey", &req.photo_key);
        owner_copy.insert("caffeineMg".into(), json!(caffeine_mg));
        owner_copy.insert("lat".into(), json!(req.lat));
        owner_copy.insert("lng".into(), json!(req.lng));
        insert_opt(&mut owner_copy, "address", &req.address);
        owner_copy.insert("createdAt".into(), json!(created_at));
        owner_copy.insert("entityType".into(), json!("Rating"));

        let mut place_copy = Item::new();
        place_copy.insert("ratingId".into(), json!(rating_id));
        place_copy.insert("userId".into(), json!(user_id));
        place_copy.insert("username".into(), json!(username));
        place_copy.insert("stars".into(), json!(req.stars));
        place_copy.insert("drinkName".into(), json!(req.drink_name));
        insert_opt(&mut place_copy, "description", &req.description);
        insert_opt(&mut place_copy, "photoKey", &req.photo_key);
        place_copy.insert("caffeineMg".into(), json!(caffeine_mg));
        insert_opt(&mut place_copy, "address", &req.address);
        place_copy.insert("createdAt".into(), json!(created_at));
        place_copy.insert("entityType".into(), json!("PlaceRating"));

        let mut meta = owner_copy.clone();
        meta.insert("username".into(), json!(username));
        meta.insert("likeCount".into(), json!(0));
        meta.insert("commentCount".into(), json!(0));
        meta.insert("entityType".into(), json!("RatingMeta"));

        let rating_sk = keyspace::rating_sk(&created_at, &rating_id);

        // The two reader-visible copies land together or not at all.
        self.store
            .transact_put(vec![
                (ItemKey::new(keyspace::user_pk(user_id), rating_sk.clone()), owner_copy),
                (ItemKey::new(keyspace::place_pk(&req.place_id), rating_sk), place_copy),
            ])
            .await?;

        // Secondary fan-out. Independent, concurrent, and non-fatal: the
        // rating is already visible, so a failure here only leaves aggregates
        // stale until the next write touches them.
        let meta_write = async {
            self.store
                .put(&ItemKey::new(keyspace::rating_pk(&rating_id), keyspace::META_SK), meta)
                .await
        };

        let user_place_write = async {
            self.store
                .update(
                    &ItemKey::new(
                        keyspace::user_pk(user_id),
                        keyspace::user_place_sk(&req.place_id),
                    ),
                    UpdateSpec::new()
                        .set("placeName", json!(req.place_name))
                        .set("lat", json!(req.lat))
                        .set("lng", json!(req.lng))
                        .set("lastVisited", json!(created_at))
                        .set("entityType", json!("UserPlace"))
                        .set("placeId", json!(req.place_id))
                        .set("address", json!(req.address.clone().unwrap_or_default()))
                        .add("visitCount", 1.0),
                )
                .await
        };

        let place_meta_write = async {
            self.store
                .update(
                    &ItemKey::new(keyspace::place_pk(&req.place_id), keyspace::META_SK),
                    UpdateSpec::new()
                        .set("name", json!(req.place_name))
                        .set("lat", json!(req.lat))
                        .set("lng", json!(req.lng))
                        .set("address", json!(req.address.clone().unwrap_or_default()))
                        .set("placeId", json!(req.place_id))
                        .set("entityType", json!("Place")),
                )
                .await?;
            aggregates::recompute_place_meta(self.store.as_ref(), &req.place_id)
                .await
                .map(|_| ())
        };

        let caffeine_write = async {
            if caffeine_mg != 0.0 {
                self.store
                    .update(
                        &ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK),
                        UpdateSpec::new().add("totalCaffeineMg", caffeine_mg),
                    )
                    .await
            } else {
                Ok(())
            }
        };

        let (meta_result, user_place_result, place_meta_result, caffeine_result) =
            tokio::join!(meta_write, user_place_write, place_meta_write, caffeine_write);
        for (label, result) in [
            ("rating meta", meta_result),
            ("user place", user_place_result),
            ("place meta", place_meta_result),
            ("caffeine total", caffeine_result),
        ] {
            if let Err(e) = result {
                warn!("Secondary write ({}) failed for rating {}: {}", label, rating_id, e);
            }
        }

        Ok(CreatedRating {
            rating_id,
            created_at,
        })
    }

    pub async fn update(
        &self,
        user_id: &str,
        rating_id: &str,
        patch: RatingPatch,
    ) -> AppResult<UpdatedRating> {
        validate_patch(&patch)?;

        let meta_key = ItemKey::new(keyspace::rating_pk(rating_id), keyspace::META_SK);
        let meta = self
            .store
            .get(&meta_key)
            .await?
            .ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;

        if field_str(&meta, "userId") != Some(user_id) {
            return Err(AppError::Forbidden(
                "You can only edit your own ratings".to_string(),
            ));
        }

        let created_at = field_str(&meta, "createdAt")
            .ok_or_else(|| AppError::DatabaseError("Rating META missing createdAt".to_string()))?
            .to_string();
        let place_id = field_str(&meta, "placeId")
            .ok_or_else(|| AppError::DatabaseError("Rating META missing placeId".to_string()))?
            .to_string();
        let rating_sk = keyspace::rating_sk(&created_at, rating_id);
        let updated_at = keyspace::now_iso();

        let old_stars = field_f64(&meta, "stars").unwrap_or(0.0);
        let old_caffeine_mg = field_f64(&meta, "caffeineMg").unwrap_or(0.0);

        let meta_update = build_partial_update(&patch, &updated_at, EDITABLE_FIELDS);
        let owner_update = build_partial_update(&patch, &updated_at, EDITABLE_FIELDS);
        let place_update = build_partial_update(&patch, &updated_at, PLACE_COPY_FIELDS);

        // All three copies in parallel; they must converge on the shared
        // fields after an edit.
        let owner_key = ItemKey::new(keyspace::user_pk(user_id), rating_sk.clone());
        let place_key = ItemKey::new(keyspace::place_pk(&place_id), rating_sk);
        futures::try_join!(
            self.store.update(&meta_key, meta_update),
            self.store.update(&owner_key, owner_update),
            self.store.update(&place_key, place_update),
        )?;

        if let Some(stars) = patch.stars {
            if stars != old_stars {
                aggregates::recompute_place_meta(self.store.as_ref(), &place_id).await?;
            }
        }

        // Caffeine total is adjusted by the delta, never recomputed.
        if let Some(caffeine_mg) = patch.caffeine_mg {
            if caffeine_mg != old_caffeine_mg {
                self.store
                    .update(
                        &ItemKey::new(keyspace::user_pk(user_id), keyspace::PROFILE_SK),
                        UpdateSpec::new().add("totalCaffeineMg", caffeine_mg - old_caffeine_mg),
                    )
                    .await?;
            }
        }

        self.apply_place_info_changes(user_id, &place_id, &patch)
            .await?;

        Ok(UpdatedRating {
            rating_id: rating_id.to_string(),
            updated_at,
        })
    }

    /// Place-descriptive fields changed on an edit propagate to the place
    /// META and the editor's UserPlace entry, changed subset only. An address
    /// explicitly sent as null is stored as an empty string on both items,
    /// unlike the rating copies where null removes the attribute.
    async fn apply_place_info_changes(
        &self,
        user_id: &str,
        place_id: &str,
        patch: &RatingPatch,
    ) -> AppResult<()> {
        let mut place_meta = UpdateSpec::new();
        let mut user_place = UpdateSpec::new();

        if let Some(place_name) = &patch.place_name {
            place_meta = place_meta.set("name", json!(place_name));
            user_place = user_place.set("placeName", json!(place_name));
        }
        if let Some(lat) = patch.lat {
            place_meta = place_meta.set("lat", json!(lat));
            user_place = user_place.set("lat", json!(lat));
        }
        if let Some(lng) = patch.lng {
            place_meta = place_meta.set("lng", json!(lng));
            user_place = user_place.set("lng", json!(lng));
        }
        if let Some(address) = &patch.address {
            let stored = address.clone().unwrap_or_default();
            place_meta = place_meta.set("address", json!(stored));
            user_place = user_place.set("address", json!(stored));
        }

        if place_meta.is_empty() && user_place.is_empty() {
            return Ok(());
        }

        let place_meta_key = ItemKey::new(keyspace::place_pk(place_id), keyspace::META_SK);
        let user_place_key =
            ItemKey::new(keyspace::user_pk(user_id), keyspace::user_place_sk(place_id));
        futures::try_join!(
            self.store.update(&place_meta_key, place_meta),
            self.store.update(&user_place_key, user_place),
        )?;
        Ok(())
    }
}
