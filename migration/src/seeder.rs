use fake::{faker, Fake};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm_migration::{
    sea_orm::{ConnectionTrait, DatabaseTransaction, Statement},
    DbErr,
};

/// Generates a square polygon (roughly `side_degrees` wide) centered on
/// `(center_lon, center_lat)`, as WKT, for use with `ST_GeomFromText`.
fn square_polygon_wkt(center_lon: f64, center_lat: f64, side_degrees: f64) -> String {
    let half = side_degrees / 2.0;

    format!(
        "POLYGON(({} {}, {} {}, {} {}, {} {}, {} {}))",
        center_lon - half,
        center_lat - half,
        center_lon + half,
        center_lat - half,
        center_lon + half,
        center_lat + half,
        center_lon - half,
        center_lat + half,
        center_lon - half,
        center_lat - half,
    )
}

/// Picks a random rate per km in a plausible range for a demo toll zone.
fn fake_rate_per_km() -> Decimal {
    let cents: i64 = rand::thread_rng().gen_range(5..=50);
    Decimal::new(cents, 2)
}

pub async fn gen_toll_zone(
    db: &DatabaseTransaction,
    zone_id: &str,
    center_lon: f64,
    center_lat: f64,
) -> Result<(), DbErr> {
    let zone_name: String = faker::address::en::CityName().fake();
    let rate = fake_rate_per_km();
    let wkt = square_polygon_wkt(center_lon, center_lat, 0.02);

    let sql = format!(
        r#"
        insert into "toll_zones" ("zone_id", "zone_name", "rate_per_km", "geom")
        values ('{zone_id}', $1, {rate}, ST_GeomFromText('{wkt}', 4326))
        on conflict ("zone_id") do nothing;
        "#,
    );

    let statement = Statement::from_sql_and_values(db.get_database_backend(), &sql, [zone_name.into()]);

    db.execute(statement).await?;

    Ok(())
}
