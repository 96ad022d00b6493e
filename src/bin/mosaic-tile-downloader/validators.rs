use mosaic_tile_downloader::{Fixture, MAX_ZOOM};

pub fn is_numeric_min(min: u64) -> impl Fn(String) -> Result<(), String> {
    move |v: String| {
        let val = v
            .parse::<u64>()
            .map_err(|_| "must be numeric".to_owned())?;

        if val < min {
            return Err(format!("must be >= {}", min));
        }

        Ok(())
    }
}

pub fn is_tile_index(v: String) -> Result<(), String> {
    v.parse::<u32>()
        .map(|_| ())
        .map_err(|_| "must be a non-negative tile index".to_owned())
}

pub fn is_zoom(v: String) -> Result<(), String> {
    let val = v.parse::<u8>().map_err(|_| "must be numeric".to_owned())?;

    if val > MAX_ZOOM {
        return Err(format!("must be <= {}", MAX_ZOOM));
    }

    Ok(())
}

pub fn is_geo_coord(v: String) -> Result<(), String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if val < -180f64 {
        return Err("must be >= -180°".to_owned());
    } else if val > 180f64 {
        return Err("must be <= 180°".to_owned());
    }

    Ok(())
}

pub fn is_bb_fixture(v: String) -> Result<(), String> {
    v.parse::<Fixture>()
        .map(|_| ())
        .map_err(|_| "invalid fixture".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_min() {
        let at_least_one = is_numeric_min(1);
        assert!(at_least_one("1".into()).is_ok());
        assert!(at_least_one("0".into()).is_err());
        assert!(at_least_one("x".into()).is_err());
    }

    #[test]
    fn zoom_range() {
        assert!(is_zoom("0".into()).is_ok());
        assert!(is_zoom("30".into()).is_ok());
        assert!(is_zoom("31".into()).is_err());
    }

    #[test]
    fn coords() {
        assert!(is_geo_coord("-180".into()).is_ok());
        assert!(is_geo_coord("180.5".into()).is_err());
        assert!(is_tile_index("-1".into()).is_err());
        assert!(is_bb_fixture("usa".into()).is_ok());
    }
}
