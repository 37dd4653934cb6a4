//! Storage of channel values in SQLite columns.
//!
//! Scalar-backed identifiers implement the sqlx traits next to their definitions. The balances are
//! covered here.

use crate::{CustomerBalance, MerchantBalance};

bolt_crypto::impl_sqlx_for_bincode_ty!(CustomerBalance);
bolt_crypto::impl_sqlx_for_bincode_ty!(MerchantBalance);

#[cfg(test)]
mod test {
    use crate::{
        revlock::{RevocationLock, RevocationSecret},
        test::rng,
        ChannelId, CustomerBalance, MerchantBalance, Nonce,
    };
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn revocation_survives_a_database_round_trip() {
        let mut rng = rng();
        let pool = pool().await;
        let _ = sqlx::query(
            "CREATE TABLE revocations (
                channel_id BLOB NOT NULL,
                nonce BLOB NOT NULL UNIQUE,
                revocation_lock BLOB NOT NULL,
                revocation_secret BLOB NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        let channel_id = ChannelId::new(
            "sqlite",
            b"key",
            &[1; 32],
            CustomerBalance::try_new(100).unwrap(),
            MerchantBalance::try_new(10).unwrap(),
        );
        let nonce = Nonce::new(&mut rng);
        let secret = RevocationSecret::new(&mut rng);
        let lock = secret.revocation_lock();

        let _ = sqlx::query(
            "INSERT INTO revocations (channel_id, nonce, revocation_lock, revocation_secret)
             VALUES (?, ?, ?, ?)",
        )
        .bind(channel_id)
        .bind(nonce)
        .bind(lock)
        .bind(secret.clone())
        .execute(&pool)
        .await
        .unwrap();

        let (stored_id, stored_lock, stored_secret): (ChannelId, RevocationLock, RevocationSecret) =
            sqlx::query_as(
                "SELECT channel_id, revocation_lock, revocation_secret FROM revocations
                 WHERE nonce = ?",
            )
            .bind(nonce)
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(stored_id, channel_id);
        assert_eq!(stored_lock, lock);
        assert!(stored_lock.verify(&stored_secret).is_verified());

        // A nonce can only be recorded once.
        let replay = sqlx::query(
            "INSERT INTO revocations (channel_id, nonce, revocation_lock, revocation_secret)
             VALUES (?, ?, ?, ?)",
        )
        .bind(channel_id)
        .bind(nonce)
        .bind(lock)
        .bind(secret)
        .execute(&pool)
        .await;
        assert!(replay.is_err());
    }

    #[tokio::test]
    async fn balances_are_stored() {
        let pool = pool().await;
        let _ = sqlx::query("CREATE TABLE balances (customer BLOB NOT NULL, merchant BLOB NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        let _ = sqlx::query("INSERT INTO balances VALUES (?, ?)")
            .bind(CustomerBalance::try_new(95).unwrap())
            .bind(MerchantBalance::try_new(15).unwrap())
            .execute(&pool)
            .await
            .unwrap();

        let (customer, merchant): (CustomerBalance, MerchantBalance) =
            sqlx::query_as("SELECT customer, merchant FROM balances")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(customer.into_inner(), 95);
        assert_eq!(merchant.into_inner(), 15);
    }
}
