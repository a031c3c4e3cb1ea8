// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.


//! The built-in settings of the benchmark functions.

use ini::Ini;
use lazy_static::lazy_static;

lazy_static! {
    /// Global settings.
    pub static ref FAASBENCH_CONF: Ini = Ini::load_from_str(include_str!("../config.toml")).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[tokio::test]
    async fn setting_shows() -> Result<()> {
        let conf = Ini::load_from_str(include_str!("../config.toml")).unwrap();

        for (sec, prop) in &conf {
            println!("Section: {:?}", sec);
            for (key, value) in prop.iter() {
                println!("{:?}:{:?}", key, value);
            }
        }

        assert_eq!(4, conf["mapreduce"]["num_mappers"].parse::<usize>().unwrap());
        assert_eq!(2, conf["mapreduce"]["num_reducers"].parse::<usize>().unwrap());
        assert_eq!("S3", &conf["storage"]["transfer_type"]);
        assert_eq!("", &conf["s3"]["endpoint"]);
        assert_eq!(
            1048576,
            conf["chain"]["payload_size"].parse::<usize>().unwrap()
        );

        Ok(())
    }
}
