//! Reference data: queue types, service points, category routing.

use super::{ReferenceSource, SimStore};
use crate::{
    config::SimConfig,
    error::{SimError, SimResult},
    model::{CategoryRoute, ServicePoint, TypeConfig},
    policy::SchedulingPolicy,
};
use rusqlite::params;

impl SimStore {
    /// Replace all reference data with the contents of `config`.
    pub fn seed_reference_data(&self, config: &SimConfig) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM category_route;
             DELETE FROM service_point_type;
             DELETE FROM service_point;
             DELETE FROM queue_type;",
        )?;

        for (pos, t) in config.queue_types.iter().enumerate() {
            tx.execute(
                "INSERT INTO queue_type (code, name, priority_weight, default_policy, enabled, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    t.code,
                    t.name,
                    t.priority_weight.map(i64::from),
                    t.default_policy.map(|p| p.as_str()),
                    t.enabled,
                    pos as i64,
                ],
            )?;
        }

        for (pos, sp) in config.service_points.iter().enumerate() {
            tx.execute(
                "INSERT INTO service_point (service_point_id, name, enabled, position)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sp.id, sp.name, sp.enabled, pos as i64],
            )?;
            for category in &sp.capabilities {
                tx.execute(
                    "INSERT OR IGNORE INTO service_point_type (service_point_id, category)
                     VALUES (?1, ?2)",
                    params![sp.id, category],
                )?;
            }
        }

        for route in &config.routing {
            tx.execute(
                "INSERT OR REPLACE INTO category_route (category, service_point_id)
                 VALUES (?1, ?2)",
                params![route.category, route.service_point_id],
            )?;
        }

        tx.commit()?;
        log::debug!(
            "reference data seeded: {} types, {} service points, {} routes",
            config.queue_types.len(),
            config.service_points.len(),
            config.routing.len()
        );
        Ok(())
    }
}

impl ReferenceSource for SimStore {
    fn queue_types(&self) -> SimResult<Vec<TypeConfig>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, priority_weight, default_policy, enabled
             FROM queue_type ORDER BY position",
        )?;
        let raw = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<i64>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, bool>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(code, name, weight, policy, enabled)| -> SimResult<TypeConfig> {
                let priority_weight = weight
                    .map(|w| {
                        u8::try_from(w).map_err(|_| {
                            SimError::UnexpectedShape(format!("queue type {code} has weight {w}"))
                        })
                    })
                    .transpose()?;
                let default_policy = policy
                    .map(|p| {
                        SchedulingPolicy::parse(&p).ok_or_else(|| {
                            SimError::UnexpectedShape(format!("queue type {code} has policy '{p}'"))
                        })
                    })
                    .transpose()?;
                Ok(TypeConfig {
                    code,
                    name,
                    priority_weight,
                    default_policy,
                    enabled,
                })
            })
            .collect()
    }

    fn service_points(&self) -> SimResult<Vec<ServicePoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT service_point_id, name, enabled FROM service_point ORDER BY position",
        )?;
        let mut points = stmt
            .query_map([], |r| {
                Ok(ServicePoint {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    capabilities: Vec::new(),
                    enabled: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut caps = self.conn.prepare(
            "SELECT category FROM service_point_type
             WHERE service_point_id = ?1 ORDER BY category",
        )?;
        for sp in points.iter_mut() {
            sp.capabilities = caps
                .query_map(params![sp.id], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(points)
    }

    fn routing(&self) -> SimResult<Vec<CategoryRoute>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, service_point_id FROM category_route ORDER BY category",
        )?;
        let routes = stmt
            .query_map([], |r| {
                Ok(CategoryRoute {
                    category: r.get(0)?,
                    service_point_id: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(routes)
    }
}
